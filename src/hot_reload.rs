// Shader hot reload
//
// A notify watcher runs on its own thread and forwards filesystem events
// over a channel. The render loop drains the channel once per frame and
// rebuilds the pipeline when one of the compiled shaders changed.

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

pub struct ShaderWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    file_names: Vec<OsString>,
}

impl ShaderWatcher {
    /// Watch the directory containing `files` for changes to those files
    pub fn new(directory: &Path, files: &[PathBuf]) -> Result<Self> {
        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(tx, Config::default())
            .context("Failed to create shader watcher")?;
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", directory))?;

        let file_names = files
            .iter()
            .filter_map(|f| f.file_name().map(|n| n.to_os_string()))
            .collect();

        log::info!("Watching {:?} for shader changes", directory);

        Ok(Self {
            _watcher: watcher,
            events: rx,
            file_names,
        })
    }

    /// Drain pending events; true if any watched shader was written
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;

        for result in self.events.try_iter() {
            match result {
                Ok(event) => {
                    if is_shader_change(&event, &self.file_names) {
                        log::debug!("Shader change: {:?}", event.paths);
                        changed = true;
                    }
                }
                Err(e) => log::warn!("Shader watch error: {}", e),
            }
        }

        changed
    }
}

fn is_shader_change(event: &Event, file_names: &[OsString]) -> bool {
    let writes = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));

    writes
        && event
            .paths
            .iter()
            .filter_map(|p| p.file_name())
            .any(|name| file_names.iter().any(|watched| watched == name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind};

    fn names() -> Vec<OsString> {
        vec![
            OsString::from("mandelbrot.vert.spv"),
            OsString::from("mandelbrot.frag.spv"),
        ]
    }

    #[test]
    fn modified_shader_triggers_reload() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/work/shaders/mandelbrot.frag.spv"));
        assert!(is_shader_change(&event, &names()));
    }

    #[test]
    fn created_shader_triggers_reload() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("shaders/mandelbrot.vert.spv"));
        assert!(is_shader_change(&event, &names()));
    }

    #[test]
    fn glsl_source_edits_are_ignored() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("shaders/mandelbrot.frag"));
        assert!(!is_shader_change(&event, &names()));
    }

    #[test]
    fn reads_and_removals_are_ignored() {
        let read = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("shaders/mandelbrot.frag.spv"));
        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("shaders/mandelbrot.frag.spv"));

        assert!(!is_shader_change(&read, &names()));
        assert!(!is_shader_change(&removed, &names()));
    }
}
