//! `asarc` — command-line archive builder.
//!
//! Builds a single archive container out of shaders, textures, merged
//! archive contents, and JSON-described batches (§6).

mod cli;

use std::path::Path;
use std::sync::Arc;

use forge::archive::{Archive, ArchiveBuilder, MergeBuildJob, ShaderBuildJob, TextureBuildJob, TextureFormat};
use forge::jobs::JobScheduler;

use cli::Args;

/// Sticky texture options carried across successive `-t` invocations, reset
/// by each `-t` the way the per-invocation `name` resets in the build job
/// they describe.
struct TextureOptions {
    allow_bc7: bool,
    allow_compression: bool,
    generate_mips: bool,
    format_override: Option<TextureFormat>,
}

impl TextureOptions {
    fn defaults() -> Self {
        Self { allow_bc7: false, allow_compression: true, generate_mips: true, format_override: None }
    }
}

fn stem(path: &str) -> String {
    Path::new(path).file_stem().and_then(|s| s.to_str()).unwrap_or(path).to_string()
}

fn dispatch_shaders(scheduler: &JobScheduler, builder: &ArchiveBuilder, paths: &[String]) -> Result<(), String> {
    for path in paths {
        let bytes = std::fs::read(path).map_err(|e| format!("failed to read {path}: {e}"))?;
        builder.add_job(ShaderBuildJob::new(scheduler, stem(path), bytes));
    }
    Ok(())
}

fn dispatch_textures(scheduler: &JobScheduler, builder: &ArchiveBuilder, paths: &[String], options: &TextureOptions) -> Result<(), String> {
    if paths.is_empty() {
        return Err("texture build requires at least one input file".into());
    }
    // Cube/array layering isn't implemented (this tool never emits a real
    // multi-layer texture); each input becomes its own single-layer file.
    for path in paths {
        let bytes = std::fs::read(path).map_err(|e| format!("failed to read {path}: {e}"))?;
        builder.add_job(TextureBuildJob::new(
            scheduler,
            stem(path),
            bytes,
            options.allow_bc7,
            options.allow_compression,
            options.generate_mips,
            options.format_override,
        ));
    }
    Ok(())
}

fn dispatch_merge(scheduler: &JobScheduler, builder: &ArchiveBuilder, path: &str) -> Result<(), String> {
    let bytes = std::fs::read(path).map_err(|e| format!("failed to read {path}: {e}"))?;
    let archive = Arc::new(Archive::parse(&bytes).map_err(|e| format!("failed to open archive {path}: {e}"))?);
    for index in 0..archive.files().len() {
        builder.add_job(MergeBuildJob::new(scheduler, Arc::clone(&archive), index));
    }
    Ok(())
}

#[derive(serde::Deserialize)]
struct JsonTexture {
    #[serde(default)]
    name: String,
    #[serde(default)]
    format: String,
    #[serde(default = "default_true")]
    mips: bool,
    #[serde(default)]
    #[allow(dead_code)]
    cube: bool,
    #[serde(default)]
    #[allow(dead_code)]
    array: bool,
    #[serde(default = "default_true")]
    allow_compression: bool,
    #[serde(default)]
    allow_bc7: bool,
    #[serde(default)]
    inputs: Vec<String>,
}

#[derive(serde::Deserialize)]
struct JsonShader {
    #[serde(default)]
    inputs: Vec<String>,
}

#[derive(serde::Deserialize)]
struct JsonArchive {
    #[serde(default)]
    textures: Vec<JsonTexture>,
    #[serde(default)]
    shaders: Vec<JsonShader>,
}

fn default_true() -> bool {
    true
}

fn dispatch_json(scheduler: &JobScheduler, builder: &ArchiveBuilder, paths: &[String]) -> Result<(), String> {
    for path in paths {
        let text = std::fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))?;
        let archive: JsonArchive = serde_json::from_str(&text).map_err(|e| format!("failed to parse {path}: {e}"))?;

        for texture in &archive.textures {
            let options = TextureOptions {
                allow_bc7: texture.allow_bc7,
                allow_compression: texture.allow_compression,
                generate_mips: texture.mips,
                format_override: TextureFormat::from_name(&texture.format),
            };
            for input in &texture.inputs {
                let bytes = std::fs::read(input).map_err(|e| format!("failed to read {input}: {e}"))?;
                let name = if texture.name.is_empty() { stem(input) } else { texture.name.clone() };
                builder.add_job(TextureBuildJob::new(scheduler, name, bytes, options.allow_bc7, options.allow_compression, options.generate_mips, options.format_override));
            }
        }

        for shader in &archive.shaders {
            dispatch_shaders(scheduler, builder, &shader.inputs)?;
        }
    }
    Ok(())
}

/// Runs `-o OUT ...operations...`. Returns the process exit code.
fn execute_build(args: &mut Args) -> i32 {
    if !args.has(1) {
        eprintln!("Output file not specified");
        return 1;
    }

    let scheduler = JobScheduler::new(0);
    let builder = ArchiveBuilder::new();
    let output_path = args.next();
    let mut texture_options = TextureOptions::defaults();

    while args.has(1) {
        let arg = args.next();
        let status = match arg.as_str() {
            "-j" => dispatch_json(&scheduler, &builder, &args.take_input_list()),
            "-a" => {
                let mut result = Ok(());
                for path in args.take_input_list() {
                    if let Err(e) = dispatch_merge(&scheduler, &builder, &path) {
                        result = Err(e);
                        break;
                    }
                }
                result
            }
            "-s" => dispatch_shaders(&scheduler, &builder, &args.take_input_list()),
            "-t" => dispatch_textures(&scheduler, &builder, &args.take_input_list(), &texture_options),
            "-t-allow-bc7" => {
                texture_options.allow_bc7 = args.take_on_off();
                Ok(())
            }
            "-t-mips" => {
                texture_options.generate_mips = args.take_on_off();
                Ok(())
            }
            "-t-cube" | "-t-layers" => {
                args.take_on_off(); // accepted for grammar compatibility; see dispatch_textures
                Ok(())
            }
            "-t-format" => {
                let name = args.next();
                texture_options.format_override = TextureFormat::from_name(&name);
                Ok(())
            }
            "-t-compression" => {
                texture_options.allow_compression = args.take_on_off();
                Ok(())
            }
            other => Err(format!("unknown argument: {other}")),
        };

        if let Err(message) = status {
            eprintln!("{message}");
            return 1;
        }
    }

    match builder.build() {
        Ok(bytes) => match std::fs::write(&output_path, bytes) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("failed to write {output_path}: {e}");
                1
            }
        },
        Err(e) => {
            eprintln!("failed to build archive: {e}");
            1
        }
    }
}

fn print_help() -> i32 {
    eprintln!("usage: asarc -o OUT [-a ARCHIVE...] [-s SHADER...] [-t IMAGE...] [-j DESC.json...]");
    eprintln!("             [-t-mips on|off] [-t-cube on|off] [-t-layers on|off]");
    eprintln!("             [-t-format NAME] [-t-compression on|off] [-t-allow-bc7 on|off]");
    1
}

fn main() {
    forge::foundation::logging::init();

    let mut args = Args::new(std::env::args().skip(1).collect());
    let status = if args.has(1) {
        match args.next().as_str() {
            "-h" | "--help" => print_help(),
            "-o" => execute_build(&mut args),
            mode => {
                eprintln!("unknown mode: {mode}");
                1
            }
        }
    } else {
        print_help()
    };

    std::process::exit(status);
}
