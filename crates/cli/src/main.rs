use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use mfio_core::Package;
use mfio_spec::Registry;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// mfio package-file toolchain.
#[derive(Parser)]
#[command(name = "mfio", version, about = "mfio package-file toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Directory of definition (.dfn) sources
    #[arg(long, global = true, default_value = "dfn")]
    dfn: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a package file against its specification and report problems
    Validate {
        /// Path to the package file
        file: PathBuf,
        /// Package type tag (e.g. dis, chd)
        #[arg(long = "package-type")]
        package_type: String,
        /// Dimension overrides, name=value (repeatable)
        #[arg(long = "dim")]
        dims: Vec<String>,
    },

    /// Load a package file and re-emit it with canonical formatting
    Roundtrip {
        /// Path to the package file
        file: PathBuf,
        /// Package type tag (e.g. dis, chd)
        #[arg(long = "package-type")]
        package_type: String,
        /// Dimension overrides, name=value (repeatable)
        #[arg(long = "dim")]
        dims: Vec<String>,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the specification of a registered package type
    Show {
        /// Package type tag; omit to list all registered types
        package_type: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Validate {
            file,
            package_type,
            dims,
        } => cmd_validate(&cli.dfn, &file, &package_type, &dims, cli.output),
        Commands::Roundtrip {
            file,
            package_type,
            dims,
            out,
        } => cmd_roundtrip(&cli.dfn, &file, &package_type, &dims, out.as_deref()),
        Commands::Show { package_type } => cmd_show(&cli.dfn, package_type.as_deref(), cli.output),
    };
    process::exit(code);
}

/// Build a registry from every `.dfn` file in the directory.
fn load_registry(dfn_dir: &Path) -> Result<Registry, String> {
    let entries = fs::read_dir(dfn_dir)
        .map_err(|e| format!("cannot read definition directory {}: {}", dfn_dir.display(), e))?;
    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("dfn") {
            continue;
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        sources.push((path.display().to_string(), text));
    }
    if sources.is_empty() {
        return Err(format!(
            "no .dfn sources found in {}",
            dfn_dir.display()
        ));
    }
    sources.sort_by(|a, b| a.0.cmp(&b.0));
    Registry::from_sources(sources).map_err(|e| e.to_string())
}

/// Parse repeated `name=value` dimension overrides.
fn parse_dims(specs: &[String]) -> Result<HashMap<String, i64>, String> {
    let mut dims = HashMap::new();
    for spec in specs {
        let (name, value) = spec
            .split_once('=')
            .ok_or_else(|| format!("--dim expects name=value, got '{}'", spec))?;
        let n: i64 = value
            .parse()
            .map_err(|_| format!("--dim {}: '{}' is not an integer", name, value))?;
        dims.insert(name.to_ascii_lowercase(), n);
    }
    Ok(dims)
}

fn load_package(
    dfn_dir: &Path,
    file: &Path,
    package_type: &str,
    dim_specs: &[String],
) -> Result<(Package, HashMap<String, i64>), String> {
    let registry = load_registry(dfn_dir)?;
    let dims = parse_dims(dim_specs)?;
    let name = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(package_type);
    let package = Package::load(&registry, package_type, name, file, &dims)
        .map_err(|e| e.to_string())?;
    Ok((package, dims))
}

fn cmd_validate(
    dfn_dir: &Path,
    file: &Path,
    package_type: &str,
    dim_specs: &[String],
    output: OutputFormat,
) -> i32 {
    match load_package(dfn_dir, file, package_type, dim_specs) {
        Ok((package, dims)) => {
            // a full write pass also checks required blocks and data
            if let Err(e) = package.write_to_string(&dims) {
                return report_failure(file, &e.to_string(), output);
            }
            match output {
                OutputFormat::Text => {
                    println!("OK: {} is a valid {} package", file.display(), package_type);
                }
                OutputFormat::Json => {
                    let body = serde_json::json!({
                        "ok": true,
                        "file": file.display().to_string(),
                        "package_type": package_type,
                    });
                    println!("{}", body);
                }
            }
            0
        }
        Err(message) => report_failure(file, &message, output),
    }
}

fn report_failure(file: &Path, message: &str, output: OutputFormat) -> i32 {
    match output {
        OutputFormat::Text => eprintln!("error: {}", message),
        OutputFormat::Json => {
            let body = serde_json::json!({
                "ok": false,
                "file": file.display().to_string(),
                "error": message,
            });
            println!("{}", body);
        }
    }
    1
}

fn cmd_roundtrip(
    dfn_dir: &Path,
    file: &Path,
    package_type: &str,
    dim_specs: &[String],
    out: Option<&Path>,
) -> i32 {
    let (package, dims) = match load_package(dfn_dir, file, package_type, dim_specs) {
        Ok(loaded) => loaded,
        Err(message) => {
            eprintln!("error: {}", message);
            return 1;
        }
    };
    let text = match package.write_to_string(&dims) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };
    match out {
        Some(path) => {
            if let Err(e) = fs::write(path, text) {
                eprintln!("error: cannot write {}: {}", path.display(), e);
                return 1;
            }
        }
        None => print!("{}", text),
    }
    0
}

fn cmd_show(dfn_dir: &Path, package_type: Option<&str>, output: OutputFormat) -> i32 {
    let registry = match load_registry(dfn_dir) {
        Ok(reg) => reg,
        Err(message) => {
            eprintln!("error: {}", message);
            return 1;
        }
    };
    match package_type {
        None => {
            let mut types: Vec<&str> = registry.package_types().collect();
            types.sort_unstable();
            match output {
                OutputFormat::Text => {
                    for t in types {
                        println!("{}", t);
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "package_types": types }));
                }
            }
            0
        }
        Some(tag) => {
            let spec = match registry.get_package_spec(tag) {
                Ok(spec) => spec,
                Err(e) => {
                    eprintln!("error: {}", e);
                    return 1;
                }
            };
            match output {
                OutputFormat::Text => {
                    println!("package-type {}", spec.package_type);
                    if spec.multi_package {
                        println!("multi-package");
                    }
                    for block in &spec.blocks {
                        let marker = if block.transient { " (transient)" } else { "" };
                        println!("block {}{}", block.name, marker);
                        for s in &block.structures {
                            let opt = if s.optional { ", optional" } else { "" };
                            println!("  {} ({:?}{})", s.name, s.kind, opt);
                        }
                    }
                }
                OutputFormat::Json => match serde_json::to_string_pretty(spec.as_ref()) {
                    Ok(body) => println!("{}", body),
                    Err(e) => {
                        eprintln!("error: {}", e);
                        return 1;
                    }
                },
            }
            0
        }
    }
}
