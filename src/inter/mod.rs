/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `store`.)

Identity arrives as the `x-hesaty-uid` header: the subject id issued by
the external authentication provider. Token validation happens upstream;
this layer's job is role gating, which it does against the in-process
user cache. The requested operation arrives as `x-hesaty-action` and is
dispatched by each role submodule.
*/
use std::fmt::Debug;
use std::sync::Arc;

use axum::{
    http::{Request, StatusCode},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Glob;
use crate::user::{Role, User};

pub mod admin;
pub mod parent;
pub mod student;
pub mod teacher;

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.insert(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

pub fn text_500(text: Option<String>) -> Response {
    match text {
        Some(text) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            text
        ).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_500.to_owned()
        ).into_response()
    }
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    (
        StatusCode::BAD_REQUEST,
        msg
    ).into_response()
}

pub fn respond_forbidden() -> Response {
    log::trace!("respond_forbidden() called.");

    (
        StatusCode::FORBIDDEN,
        "Who is this? What's your operating number?".to_owned(),
    ).into_response()
}

/// Serve `data` as JSON with the handled action echoed in the
/// `x-hesaty-action` response header.
pub fn respond_action_json<S>(action: &'static str, data: &S) -> Response
where
    S: Serialize + Debug
{
    log::trace!("respond_action_json( {:?}, ... ) called.", action);

    (
        StatusCode::OK,
        Json(data),
    ).add_headers(vec![(
        HeaderName::from_static("x-hesaty-action"),
        HeaderValue::from_static(action)
    )])
}

/// Middleware function to ensure the `x-hesaty-request-id` header is
/// maintained between request and response.
pub async fn request_identity<B>(
    req: Request<B>,
    next: Next<B>
) -> Response {
    let id_header = match req.headers().get("x-hesaty-request-id") {
        Some(id) => id.to_owned(),
        None => {
            return respond_bad_request(
                "Request must have an x-hesaty-request-id header.".to_owned()
            );
        },
    };

    let mut response = next.run(req).await;
    response.headers_mut().insert("x-hesaty-request-id", id_header);
    response
}

/// Pull the authenticated subject id out of the request headers.
pub fn requester_uid(headers: &HeaderMap) -> Result<&str, Response> {
    match headers.get("x-hesaty-uid") {
        Some(u_val) => match u_val.to_str() {
            Ok(s) => Ok(s),
            Err(e) => {
                log::error!(
                    "Failed converting uid value {:?} to &str: {}",
                    u_val, &e
                );
                Err(respond_bad_request(
                    "x-hesaty-uid value unrecognizable.".to_owned()
                ))
            },
        },
        None => Err(respond_bad_request(
            "Request must have an x-hesaty-uid header.".to_owned()
        )),
    }
}

/// Resolve the requesting user against the cache. An unknown uid gets a
/// 403, not a 500: the token was fine, but nobody by that name lives
/// here.
pub async fn requesting_user(
    headers: &HeaderMap,
    glob: &Arc<RwLock<Glob>>,
) -> Result<User, Response> {
    let uid = requester_uid(headers)?;

    let glob = glob.read().await;
    match glob.users.get(uid) {
        Some(u) => Ok(u.clone()),
        None => {
            log::warn!("Request from unknown uid {:?}.", uid);
            Err(respond_forbidden())
        },
    }
}

pub fn action_header(headers: &HeaderMap) -> Result<&str, Response> {
    match headers.get("x-hesaty-action") {
        Some(act) => match act.to_str() {
            Ok(s) => Ok(s),
            Err(_) => Err(respond_bad_request(
                "x-hesaty-action header unrecognizable.".to_owned()
            )),
        },
        None => Err(respond_bad_request(
            "Request must have an x-hesaty-action header.".to_owned()
        )),
    }
}

/// Whether `u` may use the super-admin API: either their stored role, or
/// membership of their email in the configured allow-list. The check
/// happens here, at authorization time; the user's identity is never
/// rewritten to make it pass.
pub fn authorized_super_admin(u: &User, glob: &Glob) -> bool {
    if u.role() == Role::SuperAdmin {
        return true;
    }

    glob.super_admin_emails.iter().any(|e| e == u.email())
}

/**
Flat user representation crossing the API boundary in both directions.

Role-specific fields are optional; which of them are required is decided
by `into_user()` based on the role.
*/
#[derive(Debug, Deserialize, Serialize)]
pub struct UserData {
    pub uid: String,
    pub role: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub center: Option<String>,
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teachers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub students: Vec<String>,
}

impl UserData {
    pub fn from_user(u: &User) -> UserData {
        let base = u.base();
        let mut ud = UserData {
            uid: base.uid.clone(),
            role: u.role().to_string(),
            name: base.name.clone(),
            email: base.email.clone(),
            phone: base.phone.clone(),
            center: None,
            subjects: None,
            class: None,
            parent: None,
            teachers: Vec::new(),
            students: Vec::new(),
        };

        match u {
            User::SuperAdmin(_) => {},
            User::Teacher(t) => {
                ud.center = Some(t.center.clone());
                ud.subjects = Some(t.subjects.clone());
                ud.students = t.students.clone();
            },
            User::Student(s) => {
                ud.center = Some(s.center.clone());
                ud.class = Some(s.class.clone());
                ud.parent = Some(s.parent.clone());
                ud.teachers = s.teachers.clone();
            },
            User::Parent(p) => {
                ud.students = p.students.clone();
            },
        }

        ud
    }

    pub fn into_user(self) -> Result<User, String> {
        let role: Role = self.role.parse()?;

        let base = crate::user::BaseUser {
            uid: self.uid,
            role,
            name: self.name,
            email: self.email,
            phone: self.phone,
            created_at: None,
        };

        let u = match role {
            Role::SuperAdmin => base.into_super_admin(),
            Role::Teacher => base.into_teacher(
                self.center.ok_or("teacher requires a center")?,
                self.subjects.unwrap_or_default(),
            ),
            Role::Student => base.into_student(
                self.center.ok_or("student requires a center")?,
                self.class.ok_or("student requires a class")?,
                self.parent.ok_or("student requires a parent uid")?,
                self.teachers,
            ),
            Role::Parent => base.into_parent(),
        };

        Ok(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::BaseUser;

    fn glob_with_allowlist(emails: &[&str]) -> Glob {
        let mut g = Glob::for_tests("host=localhost".to_owned());
        g.super_admin_emails = emails.iter().map(|e| (*e).to_owned()).collect();
        g
    }

    fn parent_user(email: &str) -> User {
        BaseUser {
            uid: "p.said".to_owned(),
            role: Role::Parent,
            name: "Said Sr".to_owned(),
            email: email.to_owned(),
            phone: None,
            created_at: None,
        }.into_parent()
    }

    #[test]
    fn allowlist_grants_super_admin() {
        let glob = glob_with_allowlist(&["owner@hesaty.example"]);

        assert!(authorized_super_admin(
            &parent_user("owner@hesaty.example"), &glob
        ));
        assert!(!authorized_super_admin(
            &parent_user("someone@else.example"), &glob
        ));
    }

    #[test]
    fn user_data_round_trip() {
        let ud = UserData {
            uid: "s.amira".to_owned(),
            role: "student".to_owned(),
            name: "Amira Said".to_owned(),
            email: "amira.s@example.com".to_owned(),
            phone: None,
            center: Some("downtown".to_owned()),
            subjects: None,
            class: Some("10A".to_owned()),
            parent: Some("p.said".to_owned()),
            teachers: vec!["t.hassan".to_owned()],
            students: Vec::new(),
        };

        let u = ud.into_user().unwrap();
        assert_eq!(u.role(), Role::Student);

        let back = UserData::from_user(&u);
        assert_eq!(&back.uid, "s.amira");
        assert_eq!(back.parent.as_deref(), Some("p.said"));
        assert_eq!(back.teachers, vec!["t.hassan".to_owned()]);
    }

    #[test]
    fn user_data_role_requirements() {
        let ud = UserData {
            uid: "s.x".to_owned(),
            role: "student".to_owned(),
            name: "X".to_owned(),
            email: "x@example.com".to_owned(),
            phone: None,
            center: Some("downtown".to_owned()),
            subjects: None,
            class: Some("10A".to_owned()),
            parent: None,
            teachers: Vec::new(),
            students: Vec::new(),
        };
        assert!(ud.into_user().is_err());
    }
}
