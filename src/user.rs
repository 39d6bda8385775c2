/*!
Center users.

Every user is identified by the `uid` the authentication provider issues;
there are no passwords or keys stored on this side of that boundary. The
`users` table holds what all roles share; role-specific data hangs off it.
*/
use std::io::Read;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Teacher,
    Student,
    Parent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::SuperAdmin => "super_admin",
            Role::Teacher    => "teacher",
            Role::Student    => "student",
            Role::Parent     => "parent",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "teacher"     => Ok(Role::Teacher),
            "student"     => Ok(Role::Student),
            "parent"      => Ok(Role::Parent),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BaseUser {
    pub uid: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Set by the database on insertion; `None` on a not-yet-inserted user.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl BaseUser {
    pub fn into_super_admin(self) -> User { User::SuperAdmin(self) }

    pub fn into_teacher(
        self,
        center: String,
        subjects: Vec<String>,
    ) -> User {
        User::Teacher(Teacher { base: self, center, subjects, students: Vec::new() })
    }

    pub fn into_student(
        self,
        center: String,
        class: String,
        parent: String,
        teachers: Vec<String>,
    ) -> User {
        User::Student(Student { base: self, center, class, parent, teachers })
    }

    pub fn into_parent(self) -> User {
        User::Parent(Parent { base: self, students: Vec::new() })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Teacher {
    pub base: BaseUser,
    pub center: String,
    pub subjects: Vec<String>,
    /// `uid`s of this teacher's enrolled students, in enrollment order.
    /// Derived from the `enrollments` table on retrieval; empty on a
    /// not-yet-inserted teacher.
    #[serde(default)]
    pub students: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Student {
    pub base: BaseUser,
    pub center: String,
    /// Class label, e.g. `"10A"`.
    pub class: String,
    /// `uid` of this student's parent. Required; every student row
    /// references an extant parent user.
    pub parent: String,
    /// `uid`s of this student's teachers, in enrollment order. Derived from
    /// the `enrollments` table on retrieval.
    #[serde(default)]
    pub teachers: Vec<String>,
}

impl Student {
    /**
    Student .csv rows for the bulk roster upload should look like this.
    The final (teacher) column may be blank, in which case the student
    starts unenrolled and goes through the subscription flow.

    ```csv
    #uid,    name,       email,                  phone,      parent,  class, teacher
    s.amira, Amira Said, amira.s@example.com,    0101234567, p.said,  10A,   t.hassan
    ```
    */
    pub fn from_csv_line(
        row: &csv::StringRecord
    ) -> Result<Student, &'static str> {
        log::trace!("Student::from_csv_line( {:?} ) called.", row);

        let uid = match row.get(0) {
            Some(s) => s.to_owned(),
            None => { return Err("no uid"); },
        };
        let name = match row.get(1) {
            Some(s) => s.to_owned(),
            None => { return Err("no name"); },
        };
        let email = match row.get(2) {
            Some(s) => s.to_owned(),
            None => { return Err("no email address"); },
        };
        let phone = match row.get(3) {
            Some("") => None,
            Some(s) => Some(s.to_owned()),
            None => { return Err("no phone column"); },
        };

        let base = BaseUser {
            uid,
            role: Role::Student,
            name,
            email,
            phone,
            created_at: None,
        };

        let parent = match row.get(4) {
            Some(s) => s.to_owned(),
            None => { return Err("no parent uid"); },
        };
        let class = match row.get(5) {
            Some(s) => s.to_owned(),
            None => { return Err("no class"); },
        };
        let teachers = match row.get(6) {
            Some("") => Vec::new(),
            Some(s) => vec![s.to_owned()],
            None => { return Err("no teacher column"); },
        };

        let stud = Student {
            base,
            center: String::new(),
            class,
            parent,
            teachers,
        };
        Ok(stud)
    }

    pub fn vec_from_csv_reader<R: Read>(r: R) -> Result<Vec<Student>, String> {
        log::trace!("Student::vec_from_csv_reader(...) called.");

        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(false)
            .has_headers(false)
            .from_reader(r);

        // We overestimate the amount of `Student`s required and then
        // shrink it later.
        let mut students: Vec<Student> = Vec::with_capacity(256);

        for (n, res) in csv_reader.records().enumerate() {
            match res {
                Ok(record) => match Student::from_csv_line(&record) {
                    Ok(stud) => { students.push(stud); },
                    Err(e) => {
                        let estr = match record.position() {
                            Some(p) => format!(
                                "Error on line {}: {}",
                                p.line(), &e
                            ),
                            None => format!(
                                "Error in CSV record {}: {}", &n, &e
                            ),
                        };
                        return Err(estr);
                    },
                },
                Err(e) => {
                    let estr = match e.position() {
                        Some(p) => format!(
                            "Error on line {}: {}", p.line(), &e
                        ),
                        None => format!(
                            "Error in CSV record {}: {}", &n, &e
                        ),
                    };
                    return Err(estr);
                }
            }
        }

        students.shrink_to_fit();
        log::trace!(
            "Student::vec_from_csv_reader() returns {} Students.",
            students.len()
        );
        Ok(students)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Parent {
    pub base: BaseUser,
    /// `uid`s of this parent's students. Derived on retrieval from the
    /// `parent` column of the `students` table; the link is stored once,
    /// on the student side.
    #[serde(default)]
    pub students: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum User {
    SuperAdmin(BaseUser),
    Teacher(Teacher),
    Student(Student),
    Parent(Parent),
}

impl User {
    pub fn uid(&self) -> &str {
        match self {
            User::SuperAdmin(base) => &base.uid,
            User::Teacher(t) => &t.base.uid,
            User::Student(s) => &s.base.uid,
            User::Parent(p) => &p.base.uid,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            User::SuperAdmin(base) => &base.name,
            User::Teacher(t) => &t.base.name,
            User::Student(s) => &s.base.name,
            User::Parent(p) => &p.base.name,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            User::SuperAdmin(base) => &base.email,
            User::Teacher(t) => &t.base.email,
            User::Student(s) => &s.base.email,
            User::Parent(p) => &p.base.email,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            User::SuperAdmin(_) => Role::SuperAdmin,
            User::Teacher(_) => Role::Teacher,
            User::Student(_) => Role::Student,
            User::Parent(_) => Role::Parent,
        }
    }

    pub fn base(&self) -> &BaseUser {
        match self {
            User::SuperAdmin(base) => base,
            User::Teacher(t) => &t.base,
            User::Student(s) => &s.base,
            User::Parent(p) => &p.base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    static GOOD_ROSTER: &str = "\
#uid,     name,        email,                phone,      parent,  class, teacher
s.amira,  Amira Said,  amira.s@example.com,  0101234567, p.said,  10A,   t.hassan
s.omar,   Omar Adel,   omar.a@example.com,   ,           p.adel,  10A,
";

    #[test]
    fn role_tokens_round_trip() {
        for role in [Role::SuperAdmin, Role::Teacher, Role::Student, Role::Parent] {
            let token = role.to_string();
            let parsed: Role = token.parse().unwrap();
            assert_eq!(role, parsed);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn students_from_csv() {
        ensure_logging();
        let studs = Student::vec_from_csv_reader(GOOD_ROSTER.as_bytes()).unwrap();
        assert_eq!(studs.len(), 2);

        assert_eq!(&studs[0].base.uid, "s.amira");
        assert_eq!(&studs[0].parent, "p.said");
        assert_eq!(studs[0].teachers, vec!["t.hassan".to_owned()]);

        assert_eq!(&studs[1].class, "10A");
        assert!(studs[1].base.phone.is_none());
        assert!(studs[1].teachers.is_empty());
    }

    #[test]
    fn short_csv_row_errors() {
        ensure_logging();
        let bad = "s.amira, Amira Said, amira.s@example.com, 0101234567\n";
        assert!(Student::vec_from_csv_reader(bad.as_bytes()).is_err());
    }
}
