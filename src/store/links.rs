/*!
`Store` methods for maintaining the relationships between users.

Each relationship is stored exactly once:

  * teacher/student as a row in `enrollments`;
  * student/parent as the `parent` column of the student's `students` row.

Either side of either relationship is a query away, so linking is a single
atomic statement and there is no inconsistent intermediate state for a
crash or a racing writer to expose.

```sql
CREATE TABLE enrollments (
    seq     BIGSERIAL,
    teacher TEXT NOT NULL REFERENCES users(uid),
    student TEXT NOT NULL REFERENCES users(uid),
    PRIMARY KEY (teacher, student)
);
```

`seq` preserves enrollment order, so "the first teacher a student
enrolled with" stays a meaningful notion for display.
*/
use tokio_postgres::Row;

use super::{DbError, Store};
use crate::user::Role;

fn uid_column(row: &Row, col: &str) -> Result<String, DbError> {
    row.try_get(col).map_err(DbError::from)
}

impl Store {
    /**
    Enroll `student` with `teacher`.

    Both uids are verified to exist with the right roles, then the link
    row is inserted, all in one transaction. Enrolling an
    already-enrolled pair is a no-op; the return value says whether a new
    link was actually created.
    */
    pub async fn enroll(
        &self,
        teacher: &str,
        student: &str,
    ) -> Result<bool, DbError> {
        log::trace!("Store::enroll( {:?}, {:?} ) called.", teacher, student);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        check_role(&t, teacher, Role::Teacher).await?;
        check_role(&t, student, Role::Student).await?;

        let n = t.execute(
            "INSERT INTO enrollments (teacher, student)
                VALUES ($1, $2)
                ON CONFLICT (teacher, student) DO NOTHING",
            &[&teacher, &student]
        ).await?;

        t.commit().await?;

        if n == 0 {
            log::trace!(
                "enroll(): {:?} already enrolled with {:?}.", student, teacher
            );
        }
        Ok(n == 1)
    }

    /**
    Remove `student`'s enrollment with `teacher`.

    Removing a link that isn't there is a no-op, not an error; the return
    value says whether a link was actually removed.
    */
    pub async fn unenroll(
        &self,
        teacher: &str,
        student: &str,
    ) -> Result<bool, DbError> {
        log::trace!("Store::unenroll( {:?}, {:?} ) called.", teacher, student);

        let client = self.connect().await?;

        let n = client.execute(
            "DELETE FROM enrollments WHERE teacher = $1 AND student = $2",
            &[&teacher, &student]
        ).await?;

        if n == 0 {
            log::trace!(
                "unenroll(): {:?} wasn't enrolled with {:?}.", student, teacher
            );
        }
        Ok(n == 1)
    }

    /**
    Point `student`'s parent link at `parent`.

    The link lives in one place (the student row), so this is a single
    UPDATE; the parent's view of their children is derived by query and
    can't go stale.
    */
    pub async fn set_parent(
        &self,
        student: &str,
        parent: &str,
    ) -> Result<(), DbError> {
        log::trace!("Store::set_parent( {:?}, {:?} ) called.", student, parent);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        check_role(&t, parent, Role::Parent).await?;

        let n = t.execute(
            "UPDATE students SET parent = $1 WHERE uid = $2",
            &[&parent, &student]
        ).await?;
        if n == 0 {
            return Err(DbError(format!(
                "There is no student with uid {:?}.", student
            )));
        }

        t.commit().await?;
        Ok(())
    }

    /// `uid`s of `teacher`'s enrolled students, in enrollment order.
    pub async fn students_of_teacher(
        &self,
        teacher: &str,
    ) -> Result<Vec<String>, DbError> {
        log::trace!("Store::students_of_teacher( {:?} ) called.", teacher);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT student FROM enrollments WHERE teacher = $1 ORDER BY seq",
            &[&teacher]
        ).await?;

        rows.iter().map(|r| uid_column(r, "student")).collect()
    }

    /// `uid`s of `student`'s teachers, in enrollment order. The first
    /// entry is the student's longest-standing teacher.
    pub async fn teachers_of_student(
        &self,
        student: &str,
    ) -> Result<Vec<String>, DbError> {
        log::trace!("Store::teachers_of_student( {:?} ) called.", student);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT teacher FROM enrollments WHERE student = $1 ORDER BY seq",
            &[&student]
        ).await?;

        rows.iter().map(|r| uid_column(r, "teacher")).collect()
    }

    /// `uid`s of `parent`'s students, derived from the student rows.
    pub async fn students_of_parent(
        &self,
        parent: &str,
    ) -> Result<Vec<String>, DbError> {
        log::trace!("Store::students_of_parent( {:?} ) called.", parent);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT uid FROM students WHERE parent = $1 ORDER BY uid",
            &[&parent]
        ).await?;

        rows.iter().map(|r| uid_column(r, "uid")).collect()
    }
}

/// Ensure `uid` is an extant user with role `role`.
pub(super) async fn check_role(
    t: &tokio_postgres::Transaction<'_>,
    uid: &str,
    role: Role,
) -> Result<(), DbError> {
    let row = t.query_opt(
        "SELECT role FROM users WHERE uid = $1",
        &[&uid]
    ).await?;

    match row {
        None => Err(DbError(format!(
            "There is no user with uid {:?}.", uid
        ))),
        Some(row) => {
            let role_str: &str = row.try_get("role")?;
            if role_str == role.to_string() {
                Ok(())
            } else {
                Err(DbError(format!(
                    "User {:?} has role {}, not {}.", uid, role_str, &role
                )))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;
    use crate::user::Student;

    async fn fresh_store() -> Store {
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.insert_teacher(
            "t.hassan", "Mr Hassan", "hassan@hesaty.example",
            None, "downtown", &["math".to_owned()]
        ).await.unwrap();
        db.insert_teacher(
            "t.mona", "Ms Mona", "mona@hesaty.example",
            None, "downtown", &["physics".to_owned()]
        ).await.unwrap();
        db.insert_parent("p.said", "Said Sr", "said@family.example", None)
            .await.unwrap();
        db.insert_parent("p.adel", "Adel Sr", "adel@family.example", None)
            .await.unwrap();

        let roster = "s.amira, Amira Said, amira.s@example.com, , p.said, 10A,\n";
        let studs = Student::vec_from_csv_reader(roster.as_bytes()).unwrap();
        db.insert_students(&studs).await.unwrap();

        db
    }

    #[tokio::test]
    #[serial]
    async fn enroll_links_both_sides() {
        ensure_logging();
        let db = fresh_store().await;

        let created = db.enroll("t.hassan", "s.amira").await.unwrap();
        assert!(created);

        // One link record; both derived views agree immediately.
        assert_eq!(
            db.students_of_teacher("t.hassan").await.unwrap(),
            vec!["s.amira".to_owned()]
        );
        assert_eq!(
            db.teachers_of_student("s.amira").await.unwrap(),
            vec!["t.hassan".to_owned()]
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn enroll_is_idempotent() {
        ensure_logging();
        let db = fresh_store().await;

        assert!(db.enroll("t.hassan", "s.amira").await.unwrap());
        assert!(!db.enroll("t.hassan", "s.amira").await.unwrap());

        assert_eq!(db.students_of_teacher("t.hassan").await.unwrap().len(), 1);
        assert_eq!(db.teachers_of_student("s.amira").await.unwrap().len(), 1);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn unenroll_absent_is_noop() {
        ensure_logging();
        let db = fresh_store().await;

        assert!(!db.unenroll("t.hassan", "s.amira").await.unwrap());

        assert!(db.enroll("t.hassan", "s.amira").await.unwrap());
        assert!(db.unenroll("t.hassan", "s.amira").await.unwrap());
        assert!(!db.unenroll("t.hassan", "s.amira").await.unwrap());

        assert!(db.teachers_of_student("s.amira").await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn enroll_checks_roles() {
        ensure_logging();
        let db = fresh_store().await;

        assert!(db.enroll("t.hassan", "t.mona").await.is_err());
        assert!(db.enroll("s.amira", "t.hassan").await.is_err());
        assert!(db.enroll("t.hassan", "s.ghost").await.is_err());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn multiple_teachers_keep_enrollment_order() {
        ensure_logging();
        let db = fresh_store().await;

        db.enroll("t.mona", "s.amira").await.unwrap();
        db.enroll("t.hassan", "s.amira").await.unwrap();

        assert_eq!(
            db.teachers_of_student("s.amira").await.unwrap(),
            vec!["t.mona".to_owned(), "t.hassan".to_owned()]
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn reassigning_parent_moves_derived_view() {
        ensure_logging();
        let db = fresh_store().await;

        assert_eq!(
            db.students_of_parent("p.said").await.unwrap(),
            vec!["s.amira".to_owned()]
        );

        db.set_parent("s.amira", "p.adel").await.unwrap();

        assert!(db.students_of_parent("p.said").await.unwrap().is_empty());
        assert_eq!(
            db.students_of_parent("p.adel").await.unwrap(),
            vec!["s.amira".to_owned()]
        );

        // Pointing a student at a non-parent is refused.
        assert!(db.set_parent("s.amira", "t.hassan").await.is_err());

        db.nuke_database().await.unwrap();
    }
}
