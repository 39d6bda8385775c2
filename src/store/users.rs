/*!
`Store` methods et. al. for dealing with the different kinds of users.

Inserting any user writes the shared `users` row plus the role-specific
row (if any) in a single transaction. Deletion cascades: everything that
references the uid goes in the same transaction, so no dangling reference
can survive a delete. The one exception is a parent with extant students,
which is rejected outright, because every student row requires a parent.
*/
use std::collections::HashMap;
use std::fmt::Write;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, Transaction, types::{ToSql, Type}};

use super::{DbError, Store};
use crate::user::*;

fn base_user_from_row(row: &Row) -> Result<BaseUser, DbError> {
    log::trace!("base_user_from_row( {:?} ) called", row);

    let role_str: &str = row.try_get("role")?;
    let bu = BaseUser {
        uid: row.try_get("uid")?,
        role: role_str.parse()?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        created_at: row.try_get("created_at")?,
    };

    log::trace!("    ...base_user_from_row() returning {:?}", &bu);
    Ok(bu)
}

/// Return the role of extant user `uid`, if he exists.
///
/// This function is used when inserting new users, mainly to ensure good
/// error messaging when a uid is already taken.
async fn check_existing_user_role(
    t: &Transaction<'_>,
    uid: &str,
) -> Result<Option<Role>, DbError> {
    log::trace!("check_existing_user_role( T, {:?} ) called.", uid);

    match t.query_opt(
        "SELECT role FROM users WHERE uid = $1",
        &[&uid]
    ).await.map_err(|e|
        DbError(format!("{}", &e))
            .annotate("Error querying for preexisting uid")
    )? {
        None => Ok(None),
        Some(row) => {
            let role_str: &str = row.try_get("role")
                .map_err(|e|
                    DbError(format!("{}", &e))
                        .annotate("Error getting role of preexisting uid")
                )?;
            let role: Role = role_str.parse()
                .map_err(|e: String|
                    DbError(e)
                        .annotate("Error parsing role of preexisting uid")
                )?;
            Ok(Some(role))
        },
    }
}

/// Ensure each of `uids` is an extant user with role `role`; error
/// naming the first uid that isn't.
async fn check_uids_have_role(
    t: &Transaction<'_>,
    uids: &[&str],
    role: Role,
) -> Result<(), DbError> {
    log::trace!(
        "check_uids_have_role( T, [ {} uids ], {} ) called.",
        uids.len(), &role
    );

    let rows = t.query(
        "SELECT uid, role FROM users WHERE uid = ANY($1)",
        &[&uids]
    ).await?;

    let mut found: HashMap<&str, &str> = HashMap::with_capacity(rows.len());
    for row in rows.iter() {
        found.insert(row.try_get("uid")?, row.try_get("role")?);
    }

    let role_str = role.to_string();
    for uid in uids.iter() {
        match found.get(uid) {
            None => {
                return Err(DbError(format!(
                    "There is no user with uid {:?}.", uid
                )));
            },
            Some(r) if **r != *role_str => {
                return Err(DbError(format!(
                    "User {:?} has role {}, not {}.", uid, r, &role_str
                )));
            },
            Some(_) => {},
        }
    }

    Ok(())
}

impl Store {
    async fn insert_base_user(
        &self,
        t: &Transaction<'_>,
        uid: &str,
        name: &str,
        email: &str,
        phone: Option<&str>,
        role: Role,
    ) -> Result<(), DbError> {
        log::trace!(
            "insert_base_user( T, {:?}, {:?}, {:?}, {} ) called.",
            uid, name, email, role
        );

        if let Some(role) = check_existing_user_role(t, uid).await? {
            return Err(DbError(format!(
                "User uid {} already exists with role {}.",
                uid, &role
            )));
        }

        t.execute(
            "INSERT INTO users (uid, role, name, email, phone)
                VALUES ($1, $2, $3, $4, $5)",
            &[
                &uid,
                &role.to_string(),
                &name,
                &email,
                &phone,
            ]
        ).await?;

        Ok(())
    }

    pub async fn insert_super_admin(
        &self,
        uid: &str,
        name: &str,
        email: &str,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::insert_super_admin( {:?}, {:?}, {:?} ) called.",
            uid, name, email
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        self.insert_base_user(&t, uid, name, email, None, Role::SuperAdmin).await?;

        t.commit().await?;
        log::trace!("Inserted SuperAdmin {:?} ({}).", uid, email);
        Ok(())
    }

    pub async fn insert_teacher(
        &self,
        uid: &str,
        name: &str,
        email: &str,
        phone: Option<&str>,
        center: &str,
        subjects: &[String],
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::insert_teacher( {:?}, {:?}, {:?}, {:?} ) called.",
            uid, name, email, center
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        self.insert_base_user(&t, uid, name, email, phone, Role::Teacher).await?;

        t.execute(
            "INSERT INTO teachers (uid, center, subjects)
                VALUES ($1, $2, $3)",
            &[&uid, &center, &subjects]
        ).await?;

        t.commit().await?;
        log::trace!("Inserted Teacher {:?} ({}, {})", uid, name, email);
        Ok(())
    }

    pub async fn insert_parent(
        &self,
        uid: &str,
        name: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::insert_parent( {:?}, {:?}, {:?} ) called.",
            uid, name, email
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        self.insert_base_user(&t, uid, name, email, phone, Role::Parent).await?;

        t.commit().await?;
        log::trace!("Inserted Parent {:?} ({})", uid, email);
        Ok(())
    }

    pub async fn insert_students(
        &self,
        students: &[Student]
    ) -> Result<usize, DbError> {
        log::trace!("Store::insert_students( [ {} students ] ) called.", students.len());

        let new_uids: Vec<&str> = students.iter()
            .map(|s| s.base.uid.as_str())
            .collect();

        let mut client = self.connect().await?;
        let t = client.transaction().await?;
        let preexisting_uid_query = t.prepare_typed(
            "SELECT uid, role FROM users WHERE uid = ANY($1)",
            &[Type::TEXT_ARRAY]
        ).await?;

        // Check to see if any of the new students have uids already in use
        // and return an informative error if so.
        let preexisting_uid_rows = t.query(
            &preexisting_uid_query,
            &[&new_uids]
        ).await?;
        if preexisting_uid_rows.len() > 0 {
            /* Find the length of the longest uid; it will be used to format
            our error message. This finds the maximum length _in bytes_ (and
            not characters), but this is almost undoubtedly fine here.

            Also, unwrapping is okay, because there's guaranteed to be at
            least one item in the iterator, and usizes have total order. */
            let uid_len = new_uids.iter().map(|uid| uid.len()).max().unwrap();
            let mut estr = String::from("Database already contains users with the following uids:\n");
            for row in preexisting_uid_rows.iter() {
                let uid: &str = row.try_get("uid")?;
                let role: &str = row.try_get("role")?;
                write!(
                    &mut estr,
                    "{:width$} ({})\n",
                    uid, role, width = uid_len
                ).map_err(|e| format!(
                    "There was an error preparing an error message: {}", &e
                ))?;
            }
            return Err(DbError(estr));
        }

        // Every named parent must exist (with the right role) before we
        // write the student rows that reference them, and likewise any
        // initially-assigned teachers.
        {
            let mut parent_uids: Vec<&str> = students.iter()
                .map(|s| s.parent.as_str())
                .collect();
            parent_uids.sort_unstable();
            parent_uids.dedup();
            check_uids_have_role(&t, &parent_uids, Role::Parent).await
                .map_err(|e| e.annotate("Bad parent for new student"))?;

            let mut teacher_uids: Vec<&str> = students.iter()
                .flat_map(|s| s.teachers.iter().map(|tu| tu.as_str()))
                .collect();
            teacher_uids.sort_unstable();
            teacher_uids.dedup();
            check_uids_have_role(&t, &teacher_uids, Role::Teacher).await
                .map_err(|e| e.annotate("Bad teacher for new student"))?;
        }

        let (buiq, stiq) = tokio::join!(
            t.prepare_typed(
                "INSERT INTO users (uid, role, name, email, phone)
                    VALUES ($1, $2, $3, $4, $5)",
                &[Type::TEXT, Type::TEXT, Type::TEXT, Type::TEXT, Type::TEXT]
            ),
            t.prepare_typed(
                "INSERT INTO students (uid, center, class, parent)
                    VALUES ($1, $2, $3, $4)",
                &[Type::TEXT, Type::TEXT, Type::TEXT, Type::TEXT]
            ),
        );
        let (base_user_insert_query, student_table_insert_query) = (buiq?, stiq?);

        /*
        The parameters referenced in the insert statements must be in
        slices of references, and those slices need to be bound _outside_
        the async calls being pushed into `FuturesUnordered`, hence the
        `pvec` business. Each scope is there so `inserts` will drop.
        */
        let mut n_base_inserted: u64 = 0;
        {
            let student_role = Role::Student.to_string();
            let pvec: Vec<[&(dyn ToSql + Sync); 5]> = students.iter()
                .map(|s| {
                    let p: [&(dyn ToSql + Sync); 5] =
                        [&s.base.uid, &student_role, &s.base.name, &s.base.email, &s.base.phone];
                    p
                }).collect();

            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(
                    t.execute(
                        &base_user_insert_query,
                        params
                    )
                );
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(_) => { n_base_inserted += 1; },
                    Err(e) => {
                        let estr = format!(
                            "Error inserting base user into database: {}", &e
                        );
                        return Err(DbError(estr));
                    }
                }
            }
        }

        let mut n_stud_inserted: u64 = 0;
        {
            let pvec: Vec<[&(dyn ToSql + Sync); 4]> = students.iter()
                .map(|s| {
                    let p: [&(dyn ToSql + Sync); 4] =
                        [&s.base.uid, &s.center, &s.class, &s.parent];
                    p
                }).collect();

            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(
                    t.execute(
                        &student_table_insert_query,
                        params
                    )
                );
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(_) => { n_stud_inserted += 1; },
                    Err(e) => {
                        let estr = format!(
                            "Error inserting into students table in database: {}", &e
                        );
                        return Err(DbError(estr));
                    }
                }
            }
        }

        // Initial enrollments for students whose rows named a teacher.
        for s in students.iter() {
            for teacher in s.teachers.iter() {
                t.execute(
                    "INSERT INTO enrollments (teacher, student)
                        VALUES ($1, $2)
                        ON CONFLICT (teacher, student) DO NOTHING",
                    &[teacher, &s.base.uid]
                ).await?;
            }
        }

        t.commit().await?;

        log::trace!(
            "Inserted {} base users and {} student table rows.",
            &n_base_inserted, &n_stud_inserted
        );
        Ok(n_stud_inserted as usize)
    }

    /**
    Update a user's base fields and role-specific fields.

    Role is immutable: if the stored role of `u.uid()` doesn't match the
    role of the passed value, this errors without touching anything.
    (Changing who counts as a super-admin is a configuration concern, not
    a row mutation; see `inter::authorized_super_admin`.)
    */
    pub async fn update_user(&self, u: &User) -> Result<(), DbError> {
        log::trace!("Store::update_user( {:?} ) called.", u.uid());

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        match check_existing_user_role(&t, u.uid()).await? {
            None => {
                return Err(DbError(format!(
                    "There is no user with uid {:?}.", u.uid()
                )));
            },
            Some(role) if role != u.role() => {
                return Err(DbError(format!(
                    "User {:?} has role {}; updating it to {} is not supported.",
                    u.uid(), &role, &u.role()
                )));
            },
            Some(_) => {},
        }

        let base = u.base();
        t.execute(
            "UPDATE users SET name = $1, email = $2, phone = $3
                WHERE uid = $4",
            &[&base.name, &base.email, &base.phone, &base.uid]
        ).await?;

        match u {
            User::Teacher(teach) => {
                t.execute(
                    "UPDATE teachers SET center = $1, subjects = $2
                        WHERE uid = $3",
                    &[&teach.center, &teach.subjects, &teach.base.uid]
                ).await?;
            },
            User::Student(stud) => {
                // The parent link is maintained through
                // `Store::set_parent`, not here.
                t.execute(
                    "UPDATE students SET center = $1, class = $2
                        WHERE uid = $3",
                    &[&stud.center, &stud.class, &stud.base.uid]
                ).await?;
            },
            User::SuperAdmin(_) | User::Parent(_) => {},
        }

        t.commit().await?;
        Ok(())
    }

    /**
    Deletes a user from the database, regardless of role, cascading
    through everything that references the uid: enrollments,
    subscriptions, attendance, homework, and results all go in the same
    transaction, so a delete can never leave a dangling reference behind.

    Deleting a parent who still has students is an error; students
    require a parent, so those students must be deleted or reassigned
    (`Store::set_parent`) first.
    */
    pub async fn delete_user(
        &self,
        uid: &str,
    ) -> Result<(), DbError> {
        log::trace!("Store::delete_user( {:?} ) called.", uid);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n_children: i64 = t.query_one(
            "SELECT count(*) AS n FROM students WHERE parent = $1",
            &[&uid]
        ).await?.try_get("n")?;
        if n_children > 0 {
            return Err(DbError(format!(
                "User {:?} is still the parent of {} student(s); reassign or delete them first.",
                uid, &n_children
            )));
        }

        for stmt in [
            "DELETE FROM attendance WHERE student = $1 OR teacher = $1",
            "DELETE FROM results WHERE student = $1 OR teacher = $1",
            "DELETE FROM homework WHERE teacher = $1",
            "UPDATE subscriptions SET reviewed_by = NULL WHERE reviewed_by = $1",
            "DELETE FROM subscriptions WHERE student = $1 OR teacher = $1",
            "DELETE FROM enrollments WHERE student = $1 OR teacher = $1",
            "DELETE FROM students WHERE uid = $1",
            "DELETE FROM teachers WHERE uid = $1",
        ] {
            t.execute(stmt, &[&uid]).await?;
        }

        let n = t.execute(
            "DELETE FROM users WHERE uid = $1",
            &[&uid]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no user with uid {:?}.", uid)))
        } else {
            t.commit().await?;
            Ok(())
        }
    }

    /**
    Fetch the given uids in one round trip.

    Returns the found users keyed by uid, plus the list of uids that
    resolved to nothing. A dangling reference is thus reported as exactly
    that, distinguishable from an empty relationship.
    */
    pub async fn get_users_by_uid(
        &self,
        uids: &[&str],
    ) -> Result<(HashMap<String, BaseUser>, Vec<String>), DbError> {
        log::trace!("Store::get_users_by_uid( [ {} uids ] ) called.", uids.len());

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM users WHERE uid = ANY($1)",
            &[&uids]
        ).await?;

        let mut map: HashMap<String, BaseUser> = HashMap::with_capacity(rows.len());
        for row in rows.iter() {
            let u = base_user_from_row(row)?;
            map.insert(u.uid.clone(), u);
        }

        let dangling: Vec<String> = uids.iter()
            .filter(|uid| !map.contains_key(**uid))
            .map(|uid| (*uid).to_owned())
            .collect();

        if !dangling.is_empty() {
            log::warn!(
                "get_users_by_uid(): {} of {} requested uids don't exist: {:?}",
                dangling.len(), uids.len(), &dangling
            );
        }

        Ok((map, dangling))
    }

    pub async fn get_user_by_uid(&self, uid: &str) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_uid( {:?} ) called.", uid);

        let client = self.connect().await?;
        let row = match client.query_opt(
            "SELECT * FROM users WHERE uid = $1",
            &[&uid]
        ).await? {
            None => { return Ok(None); },
            Some(row) => row,
        };

        let base = base_user_from_row(&row)?;
        let u = match base.role {
            Role::SuperAdmin => base.into_super_admin(),
            Role::Teacher => User::Teacher(self.get_teacher_by_uid(base).await?),
            Role::Student => User::Student(self.get_student_by_uid(base).await?),
            Role::Parent => User::Parent(self.get_parent_by_uid(base).await?),
        };

        Ok(Some(u))
    }

    /// Attach the `teachers` row and the derived roster to an
    /// already-fetched base user.
    async fn get_teacher_by_uid(&self, base: BaseUser) -> Result<Teacher, DbError> {
        let client = self.connect().await?;

        let row = client.query_opt(
            "SELECT center, subjects FROM teachers WHERE uid = $1",
            &[&base.uid]
        ).await?.ok_or_else(|| DbError(format!(
            "User {:?} has role teacher but no teachers row.", &base.uid
        )))?;

        let students = self.students_of_teacher(&base.uid).await?;

        Ok(Teacher {
            center: row.try_get("center")?,
            subjects: row.try_get("subjects")?,
            base,
            students,
        })
    }

    async fn get_student_by_uid(&self, base: BaseUser) -> Result<Student, DbError> {
        let client = self.connect().await?;

        let row = client.query_opt(
            "SELECT center, class, parent FROM students WHERE uid = $1",
            &[&base.uid]
        ).await?.ok_or_else(|| DbError(format!(
            "User {:?} has role student but no students row.", &base.uid
        )))?;

        let teachers = self.teachers_of_student(&base.uid).await?;

        Ok(Student {
            center: row.try_get("center")?,
            class: row.try_get("class")?,
            parent: row.try_get("parent")?,
            base,
            teachers,
        })
    }

    async fn get_parent_by_uid(&self, base: BaseUser) -> Result<Parent, DbError> {
        let students = self.students_of_parent(&base.uid).await?;

        Ok(Parent { base, students })
    }

    /**
    Load every user, fully materialized, keyed by uid.

    This backs the in-process user cache; it reads each table once and
    assembles in memory rather than issuing a query per user.
    */
    pub async fn get_users(&self) -> Result<HashMap<String, User>, DbError> {
        log::trace!("Store::get_users() called.");

        let client = self.connect().await?;
        let (user_rows, teacher_rows, student_rows, enrollment_rows) = tokio::join!(
            client.query("SELECT * FROM users", &[]),
            client.query("SELECT uid, center, subjects FROM teachers", &[]),
            client.query("SELECT uid, center, class, parent FROM students", &[]),
            client.query(
                "SELECT teacher, student FROM enrollments ORDER BY seq",
                &[]
            ),
        );
        let (user_rows, teacher_rows, student_rows, enrollment_rows) =
            (user_rows?, teacher_rows?, student_rows?, enrollment_rows?);

        let mut rosters: HashMap<String, Vec<String>> = HashMap::new();
        let mut teachers_of: HashMap<String, Vec<String>> = HashMap::new();
        for row in enrollment_rows.iter() {
            let teacher: String = row.try_get("teacher")?;
            let student: String = row.try_get("student")?;
            rosters.entry(teacher.clone()).or_default().push(student.clone());
            teachers_of.entry(student).or_default().push(teacher);
        }

        let mut children_of: HashMap<String, Vec<String>> = HashMap::new();

        let mut teacher_info: HashMap<String, (String, Vec<String>)> =
            HashMap::with_capacity(teacher_rows.len());
        for row in teacher_rows.iter() {
            let uid: String = row.try_get("uid")?;
            teacher_info.insert(
                uid,
                (row.try_get("center")?, row.try_get("subjects")?)
            );
        }

        let mut student_info: HashMap<String, (String, String, String)> =
            HashMap::with_capacity(student_rows.len());
        for row in student_rows.iter() {
            let uid: String = row.try_get("uid")?;
            let parent: String = row.try_get("parent")?;
            children_of.entry(parent.clone()).or_default().push(uid.clone());
            student_info.insert(
                uid,
                (row.try_get("center")?, row.try_get("class")?, parent)
            );
        }

        let mut map: HashMap<String, User> = HashMap::with_capacity(user_rows.len());
        for row in user_rows.iter() {
            let base = base_user_from_row(row)?;
            let uid = base.uid.clone();
            let u = match base.role {
                Role::SuperAdmin => base.into_super_admin(),
                Role::Teacher => {
                    let (center, subjects) = teacher_info.remove(&uid)
                        .ok_or_else(|| DbError(format!(
                            "User {:?} has role teacher but no teachers row.", &uid
                        )))?;
                    User::Teacher(Teacher {
                        base,
                        center,
                        subjects,
                        students: rosters.remove(&uid).unwrap_or_default(),
                    })
                },
                Role::Student => {
                    let (center, class, parent) = student_info.remove(&uid)
                        .ok_or_else(|| DbError(format!(
                            "User {:?} has role student but no students row.", &uid
                        )))?;
                    User::Student(Student {
                        base,
                        center,
                        class,
                        parent,
                        teachers: teachers_of.remove(&uid).unwrap_or_default(),
                    })
                },
                Role::Parent => User::Parent(Parent {
                    base,
                    students: children_of.remove(&uid).unwrap_or_default(),
                }),
            };
            map.insert(uid, u);
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    static ADMINS: &[(&str, &str, &str)] = &[
        ("admin", "Thelma", "thelma@hesaty.example"),
        ("nour", "Nour", "nour@hesaty.example"),
    ];

    static TEACHERS: &[(&str, &str, &str)] = &[
        ("t.hassan", "Mr Hassan", "hassan@hesaty.example"),
        ("t.mona", "Ms Mona", "mona@hesaty.example"),
    ];

    static PARENTS: &[(&str, &str, &str)] = &[
        ("p.said", "Said Sr", "said@family.example"),
        ("p.adel", "Adel Sr", "adel@family.example"),
    ];

    static ROSTER_CSV: &str = "\
#uid,    name,       email,                phone, parent, class, teacher
s.amira, Amira Said, amira.s@example.com,  ,      p.said, 10A,   t.hassan
s.omar,  Omar Adel,  omar.a@example.com,   ,      p.adel, 10A,
";

    async fn populated_store() -> Store {
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        for (uid, name, email) in ADMINS.iter() {
            db.insert_super_admin(uid, name, email).await.unwrap();
        }
        for (uid, name, email) in TEACHERS.iter() {
            db.insert_teacher(
                uid, name, email, None, "downtown",
                &["math".to_owned()]
            ).await.unwrap();
        }
        for (uid, name, email) in PARENTS.iter() {
            db.insert_parent(uid, name, email, None).await.unwrap();
        }

        let studs = Student::vec_from_csv_reader(ROSTER_CSV.as_bytes()).unwrap();
        db.insert_students(&studs).await.unwrap();

        db
    }

    #[tokio::test]
    #[serial]
    async fn insert_and_fetch_users() {
        ensure_logging();
        let db = populated_store().await;

        let umap = db.get_users().await.unwrap();
        assert_eq!(umap.len(), 8);

        for (uid, _, email) in ADMINS.iter() {
            let u = umap.get(*uid).unwrap();
            assert_eq!((u.role(), u.email()), (Role::SuperAdmin, *email));
        }

        match umap.get("t.hassan").unwrap() {
            User::Teacher(teach) => {
                assert_eq!(&teach.center, "downtown");
                assert_eq!(teach.students, vec!["s.amira".to_owned()]);
            },
            x => panic!("t.hassan came back as {:?}", x),
        }

        match db.get_user_by_uid("s.amira").await.unwrap().unwrap() {
            User::Student(stud) => {
                assert_eq!(&stud.parent, "p.said");
                assert_eq!(stud.teachers, vec!["t.hassan".to_owned()]);
            },
            x => panic!("s.amira came back as {:?}", x),
        }

        match db.get_user_by_uid("p.adel").await.unwrap().unwrap() {
            User::Parent(par) => {
                assert_eq!(par.students, vec!["s.omar".to_owned()]);
            },
            x => panic!("p.adel came back as {:?}", x),
        }

        assert!(db.get_user_by_uid("nobody").await.unwrap().is_none());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn duplicate_uid_rejected() {
        ensure_logging();
        let db = populated_store().await;

        let e = db.insert_parent(
            "t.hassan", "Imposter", "x@example.com", None
        ).await.unwrap_err();
        assert!(e.display().contains("already exists"));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn role_is_immutable() {
        ensure_logging();
        let db = populated_store().await;

        let base = match db.get_user_by_uid("p.said").await.unwrap().unwrap() {
            User::Parent(p) => p.base,
            x => panic!("p.said came back as {:?}", x),
        };
        let as_admin = base.into_super_admin();
        assert!(db.update_user(&as_admin).await.is_err());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn batched_fetch_reports_dangling() {
        ensure_logging();
        let db = populated_store().await;

        let (found, dangling) = db.get_users_by_uid(
            &["s.amira", "s.omar", "s.ghost"]
        ).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(dangling, vec!["s.ghost".to_owned()]);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn delete_cascades_and_parent_guard() {
        ensure_logging();
        let db = populated_store().await;

        // A parent with extant students can't be deleted...
        assert!(db.delete_user("p.said").await.is_err());

        // ...but deleting the student cleans up the enrollment, after
        // which teacher and parent go quietly.
        db.delete_user("s.amira").await.unwrap();
        let roster = db.students_of_teacher("t.hassan").await.unwrap();
        assert!(roster.is_empty());
        db.delete_user("p.said").await.unwrap();
        db.delete_user("t.hassan").await.unwrap();

        assert!(db.delete_user("nobody").await.is_err());

        db.nuke_database().await.unwrap();
    }
}
