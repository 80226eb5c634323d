use std::{path::PathBuf, process};

use clap::Parser;
use keel::{
    database::Dialect,
    generator::{generate_service, GeneratorOptions},
};

/// Generate a new REST service built on keel
#[derive(Parser)]
#[command(name = "keel-new", version)]
struct Args {
    /// Service name: lowercase letters, digits and hyphens (e.g. order-service)
    name: String,

    /// Database the service uses
    #[arg(short, long, value_enum, default_value_t = Dialect::Postgres)]
    database: Dialect,

    /// Port the service listens on
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Directory to create the service in
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Path to the keel crate used as a dependency
    #[arg(long, default_value = env!("CARGO_MANIFEST_DIR"))]
    keel_path: PathBuf,
}

fn main() {
    let args = Args::parse();

    let options = GeneratorOptions {
        name: args.name,
        dialect: args.database,
        port: args.port,
        output_dir: args.output_dir,
        keel_path: args.keel_path,
    };

    match generate_service(&options) {
        Ok(service) => {
            println!(
                "✅ Created {} ({}) in {}",
                options.name,
                options.dialect,
                service.root.display()
            );
            for file in &service.files {
                println!("  📄 {}", file.display());
            }
            println!();
            println!("Next steps:");
            println!("  cd {}", service.root.display());
            println!("  cp .env.example .env");
            println!("  cargo run");
        }
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    }
}
