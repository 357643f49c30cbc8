// Build script to compile GLSL shaders to SPIR-V
//
// The viewer loads the .spv files at runtime, so a missing compiler or a
// broken shader only disables drawing; it never fails the build.

use std::path::Path;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=shaders/mandelbrot.vert");
    println!("cargo:rerun-if-changed=shaders/mandelbrot.frag");

    compile_shader("shaders/mandelbrot.vert", "shaders/mandelbrot.vert.spv");
    compile_shader("shaders/mandelbrot.frag", "shaders/mandelbrot.frag.spv");
}

fn compile_shader(input: &str, output: &str) {
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    let result = Command::new("glslc")
        .arg(input_path)
        .arg("-o")
        .arg(output_path)
        .status();

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            println!(
                "cargo:warning=Failed to compile {}: exit code {:?}",
                input,
                status.code()
            );
        }
        Err(e) => {
            println!("cargo:warning=glslc not found ({}), {} was not compiled", e, input);
            println!("cargo:warning=Install the Vulkan SDK or run: glslc {} -o {}", input, output);
        }
    }
}
