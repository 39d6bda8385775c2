/*!
`Store` methods for class records: attendance, homework, exam results.

Days and dates are represented by the `time::Date` struct.

```sql
CREATE TABLE attendance (
    id      BIGSERIAL PRIMARY KEY,
    student TEXT NOT NULL REFERENCES users(uid),
    teacher TEXT NOT NULL REFERENCES users(uid),
    day     DATE NOT NULL,
    present BOOL NOT NULL,
    UNIQUE (student, teacher, day)
);

CREATE TABLE homework (
    id      BIGSERIAL PRIMARY KEY,
    teacher TEXT NOT NULL REFERENCES users(uid),
    class   TEXT NOT NULL,
    title   TEXT NOT NULL,
    due     DATE
);

CREATE TABLE results (
    id      BIGSERIAL PRIMARY KEY,
    student TEXT NOT NULL REFERENCES users(uid),
    teacher TEXT NOT NULL REFERENCES users(uid),
    exam    TEXT NOT NULL,
    score   REAL NOT NULL,
    taken   DATE
);
```

Every query here is a keyed lookup; nothing fetches a whole table to
filter in memory.
*/
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, types::{ToSql, Type}};
use time::Date;

use super::{DbError, Store};
use crate::records::{Attendance, ExamResult, Homework};

fn attendance_from_row(row: &Row) -> Result<Attendance, DbError> {
    Ok(Attendance {
        student: row.try_get("student")?,
        teacher: row.try_get("teacher")?,
        day: row.try_get("day")?,
        present: row.try_get("present")?,
    })
}

fn homework_from_row(row: &Row) -> Result<Homework, DbError> {
    Ok(Homework {
        id: row.try_get("id")?,
        teacher: row.try_get("teacher")?,
        class: row.try_get("class")?,
        title: row.try_get("title")?,
        due: row.try_get("due")?,
    })
}

fn result_from_row(row: &Row) -> Result<ExamResult, DbError> {
    Ok(ExamResult {
        id: row.try_get("id")?,
        student: row.try_get("student")?,
        teacher: row.try_get("teacher")?,
        exam: row.try_get("exam")?,
        score: row.try_get("score")?,
        taken: row.try_get("taken")?,
    })
}

impl Store {
    /**
    Record a batch of attendance marks (one teacher's class, one day,
    typically).

    Re-marking an existing (student, teacher, day) triple overwrites the
    `present` flag rather than producing a duplicate row, so a teacher
    correcting a mistake can just submit again.
    */
    pub async fn record_attendance(
        &self,
        marks: &[Attendance],
    ) -> Result<usize, DbError> {
        log::trace!("Store::record_attendance( [ {} marks ] ) called.", marks.len());

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let insert_stmt = t.prepare_typed(
            "INSERT INTO attendance (student, teacher, day, present)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (student, teacher, day)
                DO UPDATE SET present = EXCLUDED.present",
            &[Type::TEXT, Type::TEXT, Type::DATE, Type::BOOL]
        ).await?;

        let pvec: Vec<[&(dyn ToSql + Sync); 4]> = marks.iter()
            .map(|m| {
                let p: [&(dyn ToSql + Sync); 4] =
                    [&m.student, &m.teacher, &m.day, &m.present];
                p
            }).collect();

        let mut n_recorded: u64 = 0;
        {
            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(
                    t.execute(&insert_stmt, params)
                );
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(_) => { n_recorded += 1; },
                    Err(e) => {
                        let estr = format!(
                            "Error recording attendance mark: {}", &e
                        );
                        return Err(DbError(estr));
                    },
                }
            }
        }

        t.commit().await?;
        Ok(n_recorded as usize)
    }

    pub async fn get_attendance_by_student(
        &self,
        student: &str,
    ) -> Result<Vec<Attendance>, DbError> {
        log::trace!("Store::get_attendance_by_student( {:?} ) called.", student);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT student, teacher, day, present FROM attendance
                WHERE student = $1 ORDER BY day",
            &[&student]
        ).await?;

        rows.iter().map(attendance_from_row).collect()
    }

    pub async fn get_attendance_by_teacher_day(
        &self,
        teacher: &str,
        day: &Date,
    ) -> Result<Vec<Attendance>, DbError> {
        log::trace!(
            "Store::get_attendance_by_teacher_day( {:?}, {:?} ) called.",
            teacher, day
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT student, teacher, day, present FROM attendance
                WHERE teacher = $1 AND day = $2 ORDER BY student",
            &[&teacher, day]
        ).await?;

        rows.iter().map(attendance_from_row).collect()
    }

    /// Insert a homework assignment; returns its id.
    pub async fn insert_homework(&self, hw: &Homework) -> Result<i64, DbError> {
        log::trace!("Store::insert_homework( {:?} ) called.", hw);

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO homework (teacher, class, title, due)
                VALUES ($1, $2, $3, $4)
                RETURNING id",
            &[&hw.teacher, &hw.class, &hw.title, &hw.due]
        ).await?;

        let id: i64 = row.try_get("id")?;
        Ok(id)
    }

    pub async fn get_homework_by_teacher(
        &self,
        teacher: &str,
    ) -> Result<Vec<Homework>, DbError> {
        log::trace!("Store::get_homework_by_teacher( {:?} ) called.", teacher);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM homework WHERE teacher = $1 ORDER BY due",
            &[&teacher]
        ).await?;

        rows.iter().map(homework_from_row).collect()
    }

    /// Homework addressed to `class` by any of `teachers` (a student's
    /// view: their class label, their enrolled teachers).
    pub async fn get_homework_for_class(
        &self,
        teachers: &[&str],
        class: &str,
    ) -> Result<Vec<Homework>, DbError> {
        log::trace!(
            "Store::get_homework_for_class( [ {} teachers ], {:?} ) called.",
            teachers.len(), class
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM homework
                WHERE teacher = ANY($1) AND class = $2
                ORDER BY due",
            &[&teachers, &class]
        ).await?;

        rows.iter().map(homework_from_row).collect()
    }

    pub async fn insert_results(
        &self,
        results: &[ExamResult],
    ) -> Result<usize, DbError> {
        log::trace!("Store::insert_results( [ {} results ] ) called.", results.len());

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let insert_stmt = t.prepare_typed(
            "INSERT INTO results (student, teacher, exam, score, taken)
                VALUES ($1, $2, $3, $4, $5)",
            &[Type::TEXT, Type::TEXT, Type::TEXT, Type::FLOAT4, Type::DATE]
        ).await?;

        let pvec: Vec<[&(dyn ToSql + Sync); 5]> = results.iter()
            .map(|r| {
                let p: [&(dyn ToSql + Sync); 5] =
                    [&r.student, &r.teacher, &r.exam, &r.score, &r.taken];
                p
            }).collect();

        let mut n_inserted: u64 = 0;
        {
            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(
                    t.execute(&insert_stmt, params)
                );
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(_) => { n_inserted += 1; },
                    Err(e) => {
                        let estr = format!(
                            "Error inserting exam result: {}", &e
                        );
                        return Err(DbError(estr));
                    },
                }
            }
        }

        t.commit().await?;
        Ok(n_inserted as usize)
    }

    pub async fn get_results_by_student(
        &self,
        student: &str,
    ) -> Result<Vec<ExamResult>, DbError> {
        log::trace!("Store::get_results_by_student( {:?} ) called.", student);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM results WHERE student = $1 ORDER BY taken",
            &[&student]
        ).await?;

        rows.iter().map(result_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use serial_test::serial;
    use time::macros::date;

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
        db.insert_parent("p.said", "Said Sr", "said@family.example", None)
            .await.unwrap();

        let roster = "s.amira, Amira Said, amira.s@example.com, , p.said, 10A, t.hassan\n";
        let studs = Student::vec_from_csv_reader(roster.as_bytes()).unwrap();
        db.insert_students(&studs).await.unwrap();

        db
    }

    #[tokio::test]
    #[serial]
    async fn attendance_remarking_overwrites() {
        ensure_logging();
        let db = fresh_store().await;

        let day = date!(2024 - 09 - 02);
        let mark = |present| Attendance {
            student: "s.amira".to_owned(),
            teacher: "t.hassan".to_owned(),
            day,
            present,
        };

        db.record_attendance(&[mark(false)]).await.unwrap();
        db.record_attendance(&[mark(true)]).await.unwrap();

        let marks = db.get_attendance_by_student("s.amira").await.unwrap();
        assert_eq!(marks.len(), 1);
        assert!(marks[0].present);

        let by_day = db.get_attendance_by_teacher_day("t.hassan", &day)
            .await.unwrap();
        assert_eq!(by_day.len(), 1);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn homework_reaches_the_class() {
        ensure_logging();
        let db = fresh_store().await;

        let hw = Homework {
            id: 0,
            teacher: "t.hassan".to_owned(),
            class: "10A".to_owned(),
            title: "Quadratics worksheet".to_owned(),
            due: Some(date!(2024 - 09 - 09)),
        };
        let id = db.insert_homework(&hw).await.unwrap();
        assert!(id > 0);

        // Amira (class 10A, enrolled with t.hassan) sees it; a 10B view
        // doesn't.
        let seen = db.get_homework_for_class(&["t.hassan"], "10A").await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(&seen[0].title, "Quadratics worksheet");

        let unseen = db.get_homework_for_class(&["t.hassan"], "10B").await.unwrap();
        assert!(unseen.is_empty());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn results_round_trip() {
        ensure_logging();
        let db = fresh_store().await;

        let res = ExamResult {
            id: 0,
            student: "s.amira".to_owned(),
            teacher: "t.hassan".to_owned(),
            exam: "Algebra midterm".to_owned(),
            score: 87.5,
            taken: Some(date!(2024 - 11 - 01)),
        };
        assert_eq!(db.insert_results(&[res]).await.unwrap(), 1);

        let fetched = db.get_results_by_student("s.amira").await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert!(approx_eq!(f32, fetched[0].score, 87.5));

        db.nuke_database().await.unwrap();
    }
}
