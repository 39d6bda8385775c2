/*!
Database interaction module.

All center data lives in a single Postgres database. The `users` table
holds what every role shares; `teachers` and `students` hang role-specific
columns off it. Relationships are stored exactly once: the teacher/student
link as a row in `enrollments`, the student/parent link as the `parent`
column of `students`. Both sides of either relationship are derived by
query, so there is no pair of inverse arrays to drift apart.

```sql
CREATE TABLE users (
    uid        TEXT PRIMARY KEY,
    role       TEXT NOT NULL,  /* 'super_admin' | 'teacher' | 'student' | 'parent' */
    name       TEXT NOT NULL,
    email      TEXT NOT NULL,
    phone      TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE teachers (
    uid      TEXT PRIMARY KEY REFERENCES users(uid),
    center   TEXT NOT NULL,
    subjects TEXT[] NOT NULL
);

CREATE TABLE students (
    uid    TEXT PRIMARY KEY REFERENCES users(uid),
    center TEXT NOT NULL,
    class  TEXT NOT NULL,
    parent TEXT NOT NULL REFERENCES users(uid)
);

CREATE TABLE enrollments (
    seq     BIGSERIAL,
    teacher TEXT NOT NULL REFERENCES users(uid),
    student TEXT NOT NULL REFERENCES users(uid),
    PRIMARY KEY (teacher, student)
);
```

plus the `subscriptions`, `attendance`, `homework`, and `results` tables
(see the `subs` and `records` submodules).
*/
use std::fmt::Write;

use tokio_postgres::{Client, NoTls};

pub mod links;
pub mod records;
pub mod subs;
pub mod users;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            uid        TEXT PRIMARY KEY,
            role       TEXT NOT NULL,
            name       TEXT NOT NULL,
            email      TEXT NOT NULL,
            phone      TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'teachers'",
        "CREATE TABLE teachers (
            uid      TEXT PRIMARY KEY REFERENCES users(uid),
            center   TEXT NOT NULL,
            subjects TEXT[] NOT NULL
        )",
        "DROP TABLE teachers",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            uid    TEXT PRIMARY KEY REFERENCES users(uid),
            center TEXT NOT NULL,
            class  TEXT NOT NULL,
            parent TEXT NOT NULL REFERENCES users(uid)
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'enrollments'",
        "CREATE TABLE enrollments (
            seq     BIGSERIAL,
            teacher TEXT NOT NULL REFERENCES users(uid),
            student TEXT NOT NULL REFERENCES users(uid),
            PRIMARY KEY (teacher, student)
        )",
        "DROP TABLE enrollments",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'subscriptions'",
        "CREATE TABLE subscriptions (
            id               BIGSERIAL PRIMARY KEY,
            student          TEXT NOT NULL REFERENCES users(uid),
            teacher          TEXT NOT NULL REFERENCES users(uid),
            class_name       TEXT NOT NULL,
            status           TEXT NOT NULL,  /* 'pending' | 'approved' | 'rejected' */
            email_verified   BOOL NOT NULL,
            requested_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
            reviewed_at      TIMESTAMPTZ,
            reviewed_by      TEXT REFERENCES users(uid),
            rejection_reason TEXT
        )",
        "DROP TABLE subscriptions",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'attendance'",
        "CREATE TABLE attendance (
            id      BIGSERIAL PRIMARY KEY,
            student TEXT NOT NULL REFERENCES users(uid),
            teacher TEXT NOT NULL REFERENCES users(uid),
            day     DATE NOT NULL,
            present BOOL NOT NULL,
            UNIQUE (student, teacher, day)
        )",
        "DROP TABLE attendance",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'homework'",
        "CREATE TABLE homework (
            id      BIGSERIAL PRIMARY KEY,
            teacher TEXT NOT NULL REFERENCES users(uid),
            class   TEXT NOT NULL,
            title   TEXT NOT NULL,
            due     DATE
        )",
        "DROP TABLE homework",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'results'",
        "CREATE TABLE results (
            id      BIGSERIAL PRIMARY KEY,
            student TEXT NOT NULL REFERENCES users(uid),
            teacher TEXT NOT NULL REFERENCES users(uid),
            exam    TEXT NOT NULL,
            score   REAL NOT NULL,
            taken   DATE
        )",
        "DROP TABLE results",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(pub String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("Data DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "Store::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ...nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: hesaty_test
    password: hesaty_test

    with write access to:

    database: hesaty_store_test
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub static TEST_CONNECTION: &str = "host=localhost user=hesaty_test password='hesaty_test' dbname=hesaty_store_test";

    /**
    This function is for getting the database back in a blank slate state if
    a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }
}
