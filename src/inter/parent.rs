/*!
Subcrate for interoperation with Parent users.

A parent sees their own children's data and nothing else; every child
uid in a request is checked against the parent link before any records
come back.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::header::HeaderMap,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{config::Glob, user::*};
use super::*;

pub async fn api(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: Option<String>,
) -> Response {
    let par = match requesting_user(&headers, &glob).await {
        Ok(User::Parent(par)) => par,
        Ok(_) => { return respond_forbidden(); },
        Err(resp) => { return resp; },
    };

    let action = match action_header(&headers) {
        Ok(act) => act,
        Err(resp) => { return resp; },
    };

    match action {
        "populate-children" => populate_children(&par, glob.clone()).await,
        "populate-results" => populate_results(&par, body, glob.clone()).await,
        "populate-attendance" => populate_attendance(&par, body, glob.clone()).await,
        x => respond_bad_request(
            format!("{:?} is not a recognized x-hesaty-action value.", &x)
        ),
    }
}

#[derive(Debug, Serialize)]
struct ChildrenData {
    children: Vec<BaseUser>,
    missing: Vec<String>,
}

async fn populate_children(par: &Parent, glob: Arc<RwLock<Glob>>) -> Response {
    log::trace!(
        "parent::populate_children( {:?}, [ glob ] ) called.", &par.base.uid
    );

    let glob = glob.read().await;

    let child_uids = match glob.db().students_of_parent(&par.base.uid).await {
        Ok(v) => v,
        Err(e) => { return text_500(Some(format!("{}", &e))); },
    };
    let uid_refs: Vec<&str> = child_uids.iter().map(|s| s.as_str()).collect();

    let (mut found, missing) = match glob.db().get_users_by_uid(&uid_refs).await {
        Ok(pair) => pair,
        Err(e) => { return text_500(Some(format!("{}", &e))); },
    };

    let children: Vec<BaseUser> = child_uids.iter()
        .filter_map(|uid| found.remove(uid))
        .collect();

    respond_action_json("populate-children", &ChildrenData { children, missing })
}

#[derive(Debug, Deserialize)]
struct ChildData {
    student: String,
}

/// Parse the child uid out of the body and make sure it actually is one
/// of `par`'s children.
fn own_child(par: &Parent, body: Option<String>) -> Result<String, Response> {
    let body = match body {
        Some(body) => body,
        None => { return Err(respond_bad_request(
            "Request requires a JSON body.".to_owned()
        )); },
    };

    let cd: ChildData = match serde_json::from_str(&body) {
        Ok(cd) => cd,
        Err(e) => {
            log::error!(
                "Error deserializing JSON {:?} as ChildData: {}", &body, &e
            );
            return Err(respond_bad_request(
                "Unable to deserialize child uid.".to_owned()
            ));
        },
    };

    if par.students.iter().any(|s| s == &cd.student) {
        Ok(cd.student)
    } else {
        log::warn!(
            "Parent {:?} asked about student {:?}, who isn't theirs.",
            &par.base.uid, &cd.student
        );
        Err(respond_forbidden())
    }
}

async fn populate_results(
    par: &Parent,
    body: Option<String>,
    glob: Arc<RwLock<Glob>>,
) -> Response {
    let student = match own_child(par, body) {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    let glob = glob.read().await;
    match glob.db().get_results_by_student(&student).await {
        Ok(results) => respond_action_json("populate-results", &results),
        Err(e) => text_500(Some(format!("{}", &e))),
    }
}

async fn populate_attendance(
    par: &Parent,
    body: Option<String>,
    glob: Arc<RwLock<Glob>>,
) -> Response {
    let student = match own_child(par, body) {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    let glob = glob.read().await;
    match glob.db().get_attendance_by_student(&student).await {
        Ok(marks) => respond_action_json("populate-attendance", &marks),
        Err(e) => text_500(Some(format!("{}", &e))),
    }
}
