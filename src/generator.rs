//! Scaffolds a new service crate that depends on keel.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::database::Dialect;

static SERVICE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("service name pattern is valid")
});

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(
        "Invalid service name '{0}': use lowercase letters, digits and single hyphens, starting with a letter (e.g. order-service)"
    )]
    InvalidName(String),
    #[error("Directory {} already exists", .0.display())]
    TargetExists(PathBuf),
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to render Cargo.toml: {0}")]
    Manifest(#[from] toml::ser::Error),
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub name: String,
    pub dialect: Dialect,
    pub port: u16,
    /// Directory the service directory is created in
    pub output_dir: PathBuf,
    /// Location of the keel crate, referenced as a path dependency
    pub keel_path: PathBuf,
}

#[derive(Debug)]
pub struct GeneratedService {
    pub root: PathBuf,
    /// Written files, relative to `root`
    pub files: Vec<PathBuf>,
}

struct Template {
    path: &'static str,
    contents: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template {
        path: "src/main.rs",
        contents: include_str!("../templates/service/main.rs.txt"),
    },
    Template {
        path: "src/items.rs",
        contents: include_str!("../templates/service/items.rs.txt"),
    },
    Template {
        path: ".env.example",
        contents: include_str!("../templates/service/env.example.txt"),
    },
    Template {
        path: ".gitignore",
        contents: include_str!("../templates/service/gitignore.txt"),
    },
    Template {
        path: "Dockerfile",
        contents: include_str!("../templates/service/Dockerfile.txt"),
    },
    Template {
        path: "README.md",
        contents: include_str!("../templates/service/README.md.txt"),
    },
];

/// Values substituted for `{{placeholder}}` markers in the templates.
#[derive(Debug)]
struct Placeholders {
    service_name: String,
    port: String,
    database_name: String,
    db_dialect: String,
    /// Host, port and credential lines of `.env.example`
    db_connection: String,
}

impl Placeholders {
    fn new(options: &GeneratorOptions) -> Self {
        Self {
            service_name: options.name.clone(),
            port: options.port.to_string(),
            database_name: database_name(&options.name, options.dialect),
            db_dialect: options.dialect.to_string(),
            db_connection: connection_settings(options.dialect),
        }
    }

    fn render(&self, template: &str) -> String {
        [
            ("{{service_name}}", &self.service_name),
            ("{{port}}", &self.port),
            ("{{database_name}}", &self.database_name),
            ("{{db_dialect}}", &self.db_dialect),
            ("{{db_connection}}", &self.db_connection),
        ]
        .iter()
        .fold(template.to_string(), |rendered, (placeholder, value)| {
            rendered.replace(placeholder, value)
        })
    }
}

fn connection_settings(dialect: Dialect) -> String {
    match dialect {
        Dialect::Sqlite => "# SQLite stores everything in DB_NAME; no host, port or credentials".to_string(),
        Dialect::Postgres | Dialect::Mysql => format!(
            "DB_USER=app\nDB_PASSWORD=change-me\nDB_HOST=localhost\nDB_PORT={}",
            dialect.default_port()
        ),
    }
}

pub fn validate_service_name(name: &str) -> Result<(), GeneratorError> {
    if SERVICE_NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(GeneratorError::InvalidName(name.to_string()))
    }
}

/// Default database name for a service: `order-service` becomes
/// `order_service_db`, or `order-service.sqlite` for SQLite.
#[must_use]
pub fn database_name(service_name: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Sqlite => format!("{service_name}.sqlite"),
        Dialect::Postgres | Dialect::Mysql => format!("{}_db", service_name.replace('-', "_")),
    }
}

/// Writes a new service crate to `output_dir/name`.
///
/// Fails without touching anything when the name is invalid or the target
/// directory already exists.
pub fn generate_service(options: &GeneratorOptions) -> Result<GeneratedService, GeneratorError> {
    validate_service_name(&options.name)?;

    let manifest = render_manifest(options)?;
    let placeholders = Placeholders::new(options);

    let root = options.output_dir.join(&options.name);
    fs::create_dir_all(&options.output_dir).map_err(io_error(&options.output_dir))?;
    match fs::create_dir(&root) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(GeneratorError::TargetExists(root));
        }
        Err(e) => return Err(io_error(&root)(e)),
    }

    let files = populate_or_remove(&root, |root| {
        let mut files = Vec::with_capacity(TEMPLATES.len() + 1);

        write_file(root, "Cargo.toml", &manifest)?;
        files.push(PathBuf::from("Cargo.toml"));

        for template in TEMPLATES {
            write_file(root, template.path, &placeholders.render(template.contents))?;
            files.push(PathBuf::from(template.path));
        }

        Ok(files)
    })?;

    Ok(GeneratedService { root, files })
}

/// Runs `populate` on a freshly created `root`, deleting `root` again if it
/// fails so a rerun does not hit [`GeneratorError::TargetExists`].
fn populate_or_remove<T>(
    root: &Path,
    populate: impl FnOnce(&Path) -> Result<T, GeneratorError>,
) -> Result<T, GeneratorError> {
    populate(root).inspect_err(|_| {
        if let Err(e) = fs::remove_dir_all(root) {
            eprintln!("⚠️  Could not remove {}: {e}", root.display());
        }
    })
}

fn write_file(root: &Path, relative: &str, contents: &str) -> Result<(), GeneratorError> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(&path, contents).map_err(io_error(&path))
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> GeneratorError + '_ {
    move |source| GeneratorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Serialize)]
struct Manifest {
    package: Package,
    dependencies: BTreeMap<&'static str, Dependency>,
}

#[derive(Serialize)]
struct Package {
    name: String,
    version: &'static str,
    edition: &'static str,
    description: String,
    publish: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Dependency {
    Version(&'static str),
    Detailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        features: Vec<&'static str>,
    },
}

impl Dependency {
    fn with_features(version: &'static str, features: Vec<&'static str>) -> Self {
        Self::Detailed {
            version: Some(version),
            path: None,
            features,
        }
    }
}

fn render_manifest(options: &GeneratorOptions) -> Result<String, GeneratorError> {
    let sqlx_driver = match options.dialect {
        Dialect::Postgres => "sqlx-postgres",
        Dialect::Mysql => "sqlx-mysql",
        Dialect::Sqlite => "sqlx-sqlite",
    };

    let dependencies = BTreeMap::from([
        (
            "keel",
            Dependency::Detailed {
                version: None,
                path: Some(options.keel_path.display().to_string()),
                features: Vec::new(),
            },
        ),
        ("async-trait", Dependency::Version("0.1")),
        ("axum", Dependency::Version("0.8.4")),
        ("chrono", Dependency::with_features("0.4", vec!["serde"])),
        (
            "sea-orm",
            Dependency::with_features(
                "1.1.0",
                vec![
                    sqlx_driver,
                    "runtime-tokio",
                    "macros",
                    "with-uuid",
                    "with-chrono",
                    "with-json",
                ],
            ),
        ),
        ("serde", Dependency::with_features("1.0.219", vec!["derive"])),
        ("serde_json", Dependency::Version("1.0")),
        (
            "tokio",
            Dependency::with_features("1.47.1", vec!["rt-multi-thread", "macros"]),
        ),
        ("uuid", Dependency::with_features("1.12", vec!["v4", "serde"])),
        ("validator", Dependency::with_features("0.20.0", vec!["derive"])),
    ]);

    let manifest = Manifest {
        package: Package {
            name: options.name.clone(),
            version: "0.1.0",
            edition: "2021",
            description: format!("{} service", options.name),
            publish: false,
        },
        dependencies,
    };

    Ok(toml::to_string_pretty(&manifest)?)
}
