// Shader module loading
//
// Shaders are compiled to SPIR-V offline by build.rs and read from disk at
// runtime, so they can be edited and reloaded without rebuilding the viewer.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use super::VulkanDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into aligned words, rejecting anything that is not SPIR-V
pub fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).context("Malformed SPIR-V")?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => anyhow::bail!("Bad SPIR-V magic number {:#010x}", other),
        None => anyhow::bail!("Empty SPIR-V module"),
    }
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe {
        device.device.create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

/// Read a compiled shader from disk and create its module
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader {:?} (was glslc available at build time?)", path))?;
    let code = decode_spirv(&bytes).with_context(|| format!("Invalid shader {:?}", path))?;

    log::debug!("Loaded {:?} ({} words)", path, code.len());
    create_shader_module(device, &code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_spirv_header() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = decode_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_truncated_module() {
        let mut bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.pop();
        assert!(decode_spirv(&bytes).is_err());
    }

    #[test]
    fn rejects_glsl_source() {
        let source = b"#version 450\nvoid main() {}\n\0\0\0";
        assert!(decode_spirv(&source[..source.len() / 4 * 4]).is_err());
    }

    #[test]
    fn rejects_empty_file() {
        assert!(decode_spirv(&[]).is_err());
    }
}
