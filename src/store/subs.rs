/*!
`Store` methods for the subscription-request lifecycle.

```sql
CREATE TABLE subscriptions (
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
);
```

Review is terminal: the status flip carries a `WHERE status = 'pending'`
guard, so an already-reviewed request can't be reviewed again, from either
branch. Approval inserts the enrollment in the same transaction as the
flip; there is no detached backfill step.
*/
use tokio_postgres::Row;

use super::{DbError, Store};
use crate::sub::{SubStatus, Subscription};
use crate::user::Role;

fn sub_from_row(row: &Row) -> Result<Subscription, DbError> {
    let status_str: &str = row.try_get("status")?;

    Ok(Subscription {
        id: row.try_get("id")?,
        student: row.try_get("student")?,
        teacher: row.try_get("teacher")?,
        class_name: row.try_get("class_name")?,
        status: status_str.parse()?,
        email_verified: row.try_get("email_verified")?,
        requested_at: row.try_get("requested_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        rejection_reason: row.try_get("rejection_reason")?,
    })
}

impl Store {
    /**
    File a student's request to join one of a teacher's classes.

    A student may have at most one pending request per teacher; a second
    one while the first awaits review is an error. Returns the new
    subscription's id.
    */
    pub async fn insert_subscription(
        &self,
        student: &str,
        teacher: &str,
        class_name: &str,
        email_verified: bool,
    ) -> Result<i64, DbError> {
        log::trace!(
            "Store::insert_subscription( {:?}, {:?}, {:?}, {} ) called.",
            student, teacher, class_name, &email_verified
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        super::links::check_role(&t, student, Role::Student).await?;
        super::links::check_role(&t, teacher, Role::Teacher).await?;

        let n_pending: i64 = t.query_one(
            "SELECT count(*) AS n FROM subscriptions
                WHERE student = $1 AND teacher = $2 AND status = 'pending'",
            &[&student, &teacher]
        ).await?.try_get("n")?;
        if n_pending > 0 {
            return Err(DbError(format!(
                "Student {:?} already has a pending request with teacher {:?}.",
                student, teacher
            )));
        }

        let row = t.query_one(
            "INSERT INTO subscriptions
                (student, teacher, class_name, status, email_verified)
                VALUES ($1, $2, $3, 'pending', $4)
                RETURNING id",
            &[&student, &teacher, &class_name, &email_verified]
        ).await?;
        let id: i64 = row.try_get("id")?;

        t.commit().await?;
        log::trace!("Subscription {} filed ({} -> {}).", &id, student, teacher);
        Ok(id)
    }

    /**
    Approve a pending subscription.

    One transaction flips the status (guarded on `pending`) and inserts
    the enrollment, so approval and link creation land together or not at
    all. Approving an already-reviewed subscription is an error naming
    its actual status.
    */
    pub async fn approve_subscription(
        &self,
        id: i64,
        reviewer: &str,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::approve_subscription( {}, {:?} ) called.", &id, reviewer
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_opt(
            "UPDATE subscriptions
                SET status = 'approved', reviewed_at = now(), reviewed_by = $2
                WHERE id = $1 AND status = 'pending'
                RETURNING student, teacher",
            &[&id, &reviewer]
        ).await?;

        let row = match row {
            Some(row) => row,
            None => { return Err(self.review_guard_error(&t, id).await); },
        };
        let student: &str = row.try_get("student")?;
        let teacher: &str = row.try_get("teacher")?;

        // The student may already be enrolled (e.g. approved earlier via
        // a different class request); that's fine.
        t.execute(
            "INSERT INTO enrollments (teacher, student)
                VALUES ($1, $2)
                ON CONFLICT (teacher, student) DO NOTHING",
            &[&teacher, &student]
        ).await?;

        t.commit().await?;
        log::trace!(
            "Subscription {} approved; {} enrolled with {}.",
            &id, student, teacher
        );
        Ok(())
    }

    /// Reject a pending subscription, recording the reason. Same
    /// `pending` guard as approval; no enrollment is touched.
    pub async fn reject_subscription(
        &self,
        id: i64,
        reviewer: &str,
        reason: &str,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::reject_subscription( {}, {:?}, {:?} ) called.",
            &id, reviewer, reason
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute(
            "UPDATE subscriptions
                SET status = 'rejected', reviewed_at = now(),
                    reviewed_by = $2, rejection_reason = $3
                WHERE id = $1 AND status = 'pending'",
            &[&id, &reviewer, &reason]
        ).await?;

        if n == 0 {
            return Err(self.review_guard_error(&t, id).await);
        }

        t.commit().await?;
        log::trace!("Subscription {} rejected.", &id);
        Ok(())
    }

    /// Build the error for a review attempt the `pending` guard refused:
    /// either the subscription doesn't exist, or it's already terminal.
    async fn review_guard_error(
        &self,
        t: &tokio_postgres::Transaction<'_>,
        id: i64,
    ) -> DbError {
        match t.query_opt(
            "SELECT status FROM subscriptions WHERE id = $1",
            &[&id]
        ).await {
            Ok(None) => DbError(format!(
                "There is no subscription with id {}.", &id
            )),
            Ok(Some(row)) => {
                let status: String = row.try_get("status")
                    .unwrap_or_else(|_| "unreadable".to_owned());
                DbError(format!(
                    "Subscription {} has already been reviewed (status {}).",
                    &id, &status
                ))
            },
            Err(e) => DbError::from(e)
                .annotate("Error diagnosing refused review"),
        }
    }

    pub async fn get_subscription_by_id(
        &self,
        id: i64,
    ) -> Result<Option<Subscription>, DbError> {
        log::trace!("Store::get_subscription_by_id( {} ) called.", &id);

        let client = self.connect().await?;
        let row = client.query_opt(
            "SELECT * FROM subscriptions WHERE id = $1",
            &[&id]
        ).await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(sub_from_row(&row)?)),
        }
    }

    pub async fn get_subscriptions_by_teacher(
        &self,
        teacher: &str,
        status: Option<SubStatus>,
    ) -> Result<Vec<Subscription>, DbError> {
        log::trace!(
            "Store::get_subscriptions_by_teacher( {:?}, {:?} ) called.",
            teacher, &status
        );

        let client = self.connect().await?;
        let rows = match status {
            None => client.query(
                "SELECT * FROM subscriptions WHERE teacher = $1
                    ORDER BY requested_at",
                &[&teacher]
            ).await?,
            Some(status) => client.query(
                "SELECT * FROM subscriptions WHERE teacher = $1 AND status = $2
                    ORDER BY requested_at",
                &[&teacher, &status.to_string()]
            ).await?,
        };

        rows.iter().map(sub_from_row).collect()
    }

    pub async fn get_subscriptions_by_student(
        &self,
        student: &str,
    ) -> Result<Vec<Subscription>, DbError> {
        log::trace!(
            "Store::get_subscriptions_by_student( {:?} ) called.", student
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM subscriptions WHERE student = $1
                ORDER BY requested_at",
            &[&student]
        ).await?;

        rows.iter().map(sub_from_row).collect()
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
        db.insert_parent("p.said", "Said Sr", "said@family.example", None)
            .await.unwrap();

        // s.amira starts with no teachers at all.
        let roster = "s.amira, Amira Said, amira.s@example.com, , p.said, 10A,\n";
        let studs = Student::vec_from_csv_reader(roster.as_bytes()).unwrap();
        db.insert_students(&studs).await.unwrap();

        db
    }

    #[tokio::test]
    #[serial]
    async fn approval_creates_the_enrollment() {
        ensure_logging();
        let db = fresh_store().await;

        assert!(db.teachers_of_student("s.amira").await.unwrap().is_empty());

        let id = db.insert_subscription("s.amira", "t.hassan", "10A", true)
            .await.unwrap();
        db.approve_subscription(id, "t.hassan").await.unwrap();

        // The single approval call produced the full bidirectional end
        // state; no separate backfill step exists.
        assert_eq!(
            db.teachers_of_student("s.amira").await.unwrap(),
            vec!["t.hassan".to_owned()]
        );
        assert_eq!(
            db.students_of_teacher("t.hassan").await.unwrap(),
            vec!["s.amira".to_owned()]
        );

        let sub = db.get_subscription_by_id(id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubStatus::Approved);
        assert_eq!(sub.reviewed_by.as_deref(), Some("t.hassan"));
        assert!(sub.reviewed_at.is_some());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn review_is_terminal() {
        ensure_logging();
        let db = fresh_store().await;

        let id = db.insert_subscription("s.amira", "t.hassan", "10A", true)
            .await.unwrap();
        db.approve_subscription(id, "t.hassan").await.unwrap();

        let e = db.approve_subscription(id, "t.hassan").await.unwrap_err();
        assert!(e.display().contains("approved"));
        let e = db.reject_subscription(id, "t.hassan", "no seats").await.unwrap_err();
        assert!(e.display().contains("approved"));

        assert!(db.approve_subscription(9999, "t.hassan").await.is_err());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn rejection_records_reason_and_no_enrollment() {
        ensure_logging();
        let db = fresh_store().await;

        let id = db.insert_subscription("s.amira", "t.hassan", "10A", false)
            .await.unwrap();
        db.reject_subscription(id, "t.hassan", "class is full").await.unwrap();

        let sub = db.get_subscription_by_id(id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubStatus::Rejected);
        assert_eq!(sub.rejection_reason.as_deref(), Some("class is full"));
        assert!(db.teachers_of_student("s.amira").await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn duplicate_pending_request_refused() {
        ensure_logging();
        let db = fresh_store().await;

        db.insert_subscription("s.amira", "t.hassan", "10A", true)
            .await.unwrap();
        assert!(
            db.insert_subscription("s.amira", "t.hassan", "10B", true)
                .await.is_err()
        );

        let pending = db.get_subscriptions_by_teacher(
            "t.hassan", Some(SubStatus::Pending)
        ).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(&pending[0].class_name, "10A");

        db.nuke_database().await.unwrap();
    }
}
