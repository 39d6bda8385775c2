/*!
Subcrate for interoperation with super-admin users.

Admission here is `authorized_super_admin`: the stored role, or the
configured email allow-list, checked at the door.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::header::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::Glob;
use crate::user::*;
use super::*;

pub async fn api(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: Option<String>,
) -> Response {
    let u = match requesting_user(&headers, &glob).await {
        Ok(u) => u,
        Err(resp) => { return resp; },
    };

    {
        let glob = glob.read().await;
        if !authorized_super_admin(&u, &glob) {
            return respond_forbidden();
        }
    }

    let action = match action_header(&headers) {
        Ok(act) => act,
        Err(resp) => { return resp; },
    };

    match action {
        "populate-users" => populate_role(glob.clone(), None).await,
        "populate-teachers" => populate_role(glob.clone(), Some(Role::Teacher)).await,
        "populate-students" => populate_role(glob.clone(), Some(Role::Student)).await,
        "populate-parents" => populate_role(glob.clone(), Some(Role::Parent)).await,
        "add-user" => add_user(body, glob.clone()).await,
        "update-user" => update_user(body, glob.clone()).await,
        "delete-user" => delete_user(body, glob.clone()).await,
        "upload-students" => upload_students(body, glob.clone()).await,
        "link-student" => link_student(body, glob.clone(), true).await,
        "unlink-student" => link_student(body, glob.clone(), false).await,
        "assign-parent" => assign_parent(body, glob.clone()).await,
        x => respond_bad_request(
            format!("{:?} is not a recognizable x-hesaty-action value.", x)
        ),
    }
}

async fn populate_role(glob: Arc<RwLock<Glob>>, role: Option<Role>) -> Response {
    log::trace!("admin::populate_role( Glob, {:?} ) called.", &role);

    let glob = glob.read().await;
    let mut users: Vec<UserData> = glob.users.values()
        .filter(|u| match role {
            None => true,
            Some(role) => u.role() == role,
        })
        .map(UserData::from_user)
        .collect();
    users.sort_by(|a, b| (&a.role, &a.uid).cmp(&(&b.role, &b.uid)));

    respond_action_json("populate-users", &users)
}

fn required_body(body: Option<String>) -> Result<String, Response> {
    match body {
        Some(body) => Ok(body),
        None => Err(respond_bad_request(
            "Request requires a body.".to_owned()
        )),
    }
}

fn user_from_body(body: Option<String>) -> Result<User, Response> {
    let body = required_body(body)?;

    let ud: UserData = match serde_json::from_str(&body) {
        Ok(ud) => ud,
        Err(e) => {
            log::error!(
                "Error deserializing JSON {:?} as UserData: {}",
                &body, &e
            );
            return Err(text_500(Some("Unable to deserialize user.".to_owned())));
        },
    };

    ud.into_user().map_err(respond_bad_request)
}

async fn add_user(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let u = match user_from_body(body) {
        Ok(u) => u,
        Err(resp) => { return resp; },
    };

    {
        let mut glob = glob.write().await;
        if let Err(e) = glob.insert_user(&u).await {
            log::error!(
                "Error inserting new user ({:?}) into database: {}",
                u.uid(), &e,
            );
            return text_500(Some(
                format!("Unable to insert user into database: {}", &e)
            ));
        }
        if let Err(e) = glob.refresh_users().await {
            log::error!("Error refreshing user cache from database: {}", &e);
            return text_500(Some("Unable to reread users from database.".to_owned()));
        }
    }

    populate_role(glob, None).await
}

async fn update_user(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let u = match user_from_body(body) {
        Ok(u) => u,
        Err(resp) => { return resp; },
    };

    {
        let mut glob = glob.write().await;
        if let Err(e) = glob.db().update_user(&u).await {
            log::error!(
                "Error updating user {:?} in database: {}",
                u.uid(), &e,
            );
            return text_500(Some(
                format!("Unable to update user in database: {}", &e)
            ));
        }
        if let Err(e) = glob.refresh_users().await {
            log::error!("Error refreshing user cache from database: {}", &e);
            return text_500(Some("Unable to reread users from database.".to_owned()));
        }
    }

    populate_role(glob, None).await
}

#[derive(Debug, Deserialize)]
struct UidData {
    uid: String,
}

async fn delete_user(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let body = match required_body(body) {
        Ok(body) => body,
        Err(resp) => { return resp; },
    };

    let ud: UidData = match serde_json::from_str(&body) {
        Ok(ud) => ud,
        Err(e) => {
            log::error!("Error deserializing JSON {:?} as UidData: {}", &body, &e);
            return respond_bad_request("Unable to deserialize uid.".to_owned());
        },
    };

    {
        let mut glob = glob.write().await;
        if let Err(e) = glob.db().delete_user(&ud.uid).await {
            log::error!("Error deleting user {:?}: {}", &ud.uid, &e);
            return text_500(Some(
                format!("Unable to delete user: {}", &e)
            ));
        }
        if let Err(e) = glob.refresh_users().await {
            log::error!("Error refreshing user cache from database: {}", &e);
            return text_500(Some("Unable to reread users from database.".to_owned()));
        }
    }

    populate_role(glob, None).await
}

async fn upload_students(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let body = match required_body(body) {
        Ok(body) => body,
        Err(resp) => { return resp; },
    };

    {
        let glob = glob.read().await;
        if let Err(e) = glob.upload_students(&body).await {
            log::error!(
                "Error uploading new students via CSV: {}\n\nCSV text:\n\n{}\n",
                &e, &body
            );
            return text_500(Some(e.to_string()));
        }
    }
    {
        let mut glob = glob.write().await;
        if let Err(e) = glob.refresh_users().await {
            log::error!("Error refreshing user cache from database: {}", &e);
            return text_500(Some("Unable to reread users from database.".to_owned()));
        }
    }

    populate_role(glob, Some(Role::Student)).await
}

#[derive(Debug, Deserialize)]
struct LinkData {
    teacher: String,
    student: String,
}

/// Create (or, with `create == false`, remove) a teacher/student
/// enrollment on an admin's say-so.
async fn link_student(
    body: Option<String>,
    glob: Arc<RwLock<Glob>>,
    create: bool,
) -> Response {
    let body = match required_body(body) {
        Ok(body) => body,
        Err(resp) => { return resp; },
    };

    let ld: LinkData = match serde_json::from_str(&body) {
        Ok(ld) => ld,
        Err(e) => {
            log::error!("Error deserializing JSON {:?} as LinkData: {}", &body, &e);
            return respond_bad_request("Unable to deserialize link request.".to_owned());
        },
    };

    {
        let mut glob = glob.write().await;

        let res = if create {
            glob.db().enroll(&ld.teacher, &ld.student).await
        } else {
            glob.db().unenroll(&ld.teacher, &ld.student).await
        };
        match res {
            Ok(changed) => {
                log::trace!(
                    "admin link_student( {:?}, {:?}, {} ): changed = {}",
                    &ld.teacher, &ld.student, &create, &changed
                );
            },
            Err(e) => {
                return text_500(Some(format!("Unable to change link: {}", &e)));
            },
        }

        if let Err(e) = glob.refresh_users().await {
            log::error!("Error refreshing user cache from database: {}", &e);
            return text_500(Some("Unable to reread users from database.".to_owned()));
        }
    }

    populate_role(glob, Some(Role::Student)).await
}

#[derive(Debug, Deserialize)]
struct ParentData {
    student: String,
    parent: String,
}

async fn assign_parent(body: Option<String>, glob: Arc<RwLock<Glob>>) -> Response {
    let body = match required_body(body) {
        Ok(body) => body,
        Err(resp) => { return resp; },
    };

    let pd: ParentData = match serde_json::from_str(&body) {
        Ok(pd) => pd,
        Err(e) => {
            log::error!("Error deserializing JSON {:?} as ParentData: {}", &body, &e);
            return respond_bad_request("Unable to deserialize parent assignment.".to_owned());
        },
    };

    {
        let mut glob = glob.write().await;
        if let Err(e) = glob.db().set_parent(&pd.student, &pd.parent).await {
            log::error!(
                "Error assigning parent {:?} to student {:?}: {}",
                &pd.parent, &pd.student, &e
            );
            return text_500(Some(format!("Unable to assign parent: {}", &e)));
        }
        if let Err(e) = glob.refresh_users().await {
            log::error!("Error refreshing user cache from database: {}", &e);
            return text_500(Some("Unable to reread users from database.".to_owned()));
        }
    }

    populate_role(glob, Some(Role::Student)).await
}
