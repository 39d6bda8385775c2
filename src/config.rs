/*!
Structs to hold configuration data and global variables.
*/
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::{
    store::{DbError, Store},
    user::{Student, User},
};

#[derive(Deserialize)]
struct ConfigFile {
    data_db_connect_string: Option<String>,
    default_admin_uid: Option<String>,
    default_admin_name: Option<String>,
    default_admin_email: Option<String>,
    super_admin_emails: Option<Vec<String>>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug)]
pub struct Cfg {
    pub data_db_connect_string: String,
    pub default_admin_uid: String,
    pub default_admin_name: String,
    pub default_admin_email: String,
    /// Emails granted super-admin authorization regardless of stored
    /// role. Consulted at authorization time; never mutates anyone's
    /// stored identity.
    pub super_admin_emails: Vec<String>,
    pub addr: SocketAddr,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            data_db_connect_string: "host=localhost user=hesaty_test password='hesaty_test' dbname=hesaty_store_test".to_owned(),
            default_admin_uid: "root".to_owned(),
            default_admin_name: "Default Admin".to_owned(),
            default_admin_email: "admin@hesaty.not.an.address".to_owned(),
            super_admin_emails: Vec::new(),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                8001
            ),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.data_db_connect_string {
            c.data_db_connect_string = s;
        }
        if let Some(s) = cf.default_admin_uid {
            c.default_admin_uid = s;
        }
        if let Some(s) = cf.default_admin_name {
            c.default_admin_name = s;
        }
        if let Some(s) = cf.default_admin_email {
            c.default_admin_email = s;
        }
        if let Some(v) = cf.super_admin_emails {
            c.super_admin_emails = v;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }

        Ok(c)
    }
}

/**
This guy will haul around the global state and be passed in an
`axum::Extension` to the handlers who need him.

The `users` map is an in-process cache of the full user set; mutating
handlers write through the `Store` and then `refresh_users()`.
*/
pub struct Glob {
    db: Store,
    pub users: HashMap<String, User>,
    pub super_admin_emails: Vec<String>,
    pub addr: SocketAddr,
}

impl Glob {
    pub fn db(&self) -> &Store { &self.db }

    /// Empty Glob for unit tests that never touch the database.
    #[cfg(test)]
    pub fn for_tests(connect_string: String) -> Glob {
        Glob {
            db: Store::new(connect_string),
            users: HashMap::new(),
            super_admin_emails: Vec::new(),
            addr: SocketAddr::new("127.0.0.1".parse().unwrap(), 0),
        }
    }

    /// Reread the user cache from the database.
    pub async fn refresh_users(&mut self) -> Result<(), DbError> {
        log::trace!("Glob::refresh_users() called.");

        self.users = self.db.get_users().await?;
        log::trace!("    ...{} users cached.", self.users.len());
        Ok(())
    }

    /// Insert a new user of any role.
    pub async fn insert_user(&self, u: &User) -> Result<(), DbError> {
        log::trace!("Glob::insert_user( {:?} ) called.", u.uid());

        match u {
            User::SuperAdmin(base) => {
                self.db.insert_super_admin(
                    &base.uid, &base.name, &base.email
                ).await
            },
            User::Teacher(teach) => {
                self.db.insert_teacher(
                    &teach.base.uid,
                    &teach.base.name,
                    &teach.base.email,
                    teach.base.phone.as_deref(),
                    &teach.center,
                    &teach.subjects,
                ).await
            },
            User::Student(stud) => {
                self.db.insert_students(std::slice::from_ref(stud)).await
                    .map(|_| ())
            },
            User::Parent(par) => {
                self.db.insert_parent(
                    &par.base.uid,
                    &par.base.name,
                    &par.base.email,
                    par.base.phone.as_deref(),
                ).await
            },
        }
    }

    /// Parse and bulk-insert a CSV student roster.
    pub async fn upload_students(&self, csv_text: &str) -> Result<usize, DbError> {
        log::trace!(
            "Glob::upload_students( [ {} bytes of CSV ] ) called.",
            csv_text.len()
        );

        let students = Student::vec_from_csv_reader(csv_text.as_bytes())
            .map_err(DbError::from)?;
        self.db.insert_students(&students).await
    }
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
///
/// Also assures existence of the default super-admin.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let cfg = Cfg::from_file(path.as_ref())?;
    log::info!("Configuration file read:\n{:#?}", &cfg);

    log::trace!("Checking state of data DB...");
    let data_db = Store::new(cfg.data_db_connect_string.clone());
    if let Err(e) = data_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    log::trace!("Checking existence of default super-admin in data DB...");
    match data_db.get_user_by_uid(&cfg.default_admin_uid).await {
        Err(e) => {
            let estr = format!(
                "Error attempting to check existence of default super-admin ({}) in data DB: {}",
                &cfg.default_admin_uid, &e
            );
            return Err(estr);
        },
        Ok(None) => {
            log::info!(
                "Default super-admin ({}) doesn't exist in data DB; inserting.",
                &cfg.default_admin_uid
            );
            if let Err(e) = data_db.insert_super_admin(
                &cfg.default_admin_uid,
                &cfg.default_admin_name,
                &cfg.default_admin_email,
            ).await {
                let estr = format!(
                    "Error inserting default super-admin into data DB: {}",
                    &e
                );
                return Err(estr);
            }
        },
        Ok(Some(_)) => {},
    }
    log::trace!("Default super-admin OK in data DB.");

    log::trace!("Retrieving users from data DB.");
    let users = data_db.get_users().await
        .map_err(|e| format!("Error retrieving users from data DB: {}", &e))?;
    log::info!("Retrieved {} users from data DB.", &users.len());

    let glob = Glob {
        db: data_db,
        users,
        super_admin_emails: cfg.super_admin_emails,
        addr: cfg.addr,
    };

    Ok(glob)
}

#[cfg(test)]
mod tests {
    use super::*;

    static CONFIG_TOML: &str = r#"
data_db_connect_string = "host=localhost user=hesaty dbname=hesaty_store"
super_admin_emails = ["owner@hesaty.example"]
host = "127.0.0.1"
port = 9090
"#;

    #[test]
    fn config_overlays_defaults() {
        let path = std::env::temp_dir().join("hesaty_test_config.toml");
        std::fs::write(&path, CONFIG_TOML).unwrap();

        let cfg = Cfg::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            &cfg.data_db_connect_string,
            "host=localhost user=hesaty dbname=hesaty_store"
        );
        assert_eq!(cfg.super_admin_emails, vec!["owner@hesaty.example".to_owned()]);
        assert_eq!(cfg.addr.port(), 9090);
        // Unset fields keep their defaults.
        assert_eq!(&cfg.default_admin_uid, "root");
    }
}
