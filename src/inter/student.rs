/*!
Subcrate for interoperation with Student users.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::header::HeaderMap,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::{config::Glob, user::*};
use super::*;

pub async fn api(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: Option<String>,
) -> Response {
    let stud = match requesting_user(&headers, &glob).await {
        Ok(User::Student(stud)) => stud,
        Ok(_) => { return respond_forbidden(); },
        Err(resp) => { return resp; },
    };

    let action = match action_header(&headers) {
        Ok(act) => act,
        Err(resp) => { return resp; },
    };

    match action {
        "populate-teachers" => populate_teachers(&stud, glob.clone()).await,
        "populate-subscriptions" => populate_subscriptions(&stud, glob.clone()).await,
        "request-subscription" => request_subscription(&stud, &headers, body, glob.clone()).await,
        "populate-homework" => populate_homework(&stud, glob.clone()).await,
        "populate-results" => populate_results(&stud, glob.clone()).await,
        "populate-attendance" => populate_attendance(&stud, glob.clone()).await,
        x => respond_bad_request(
            format!("{:?} is not a recognized x-hesaty-action value.", &x)
        ),
    }
}

#[derive(Debug, Serialize)]
struct TeachersData {
    teachers: Vec<BaseUser>,
    /// Enrollment rows pointing at uids that no longer resolve. Reported
    /// rather than silently shown as "no teachers".
    missing: Vec<String>,
}

async fn populate_teachers(stud: &Student, glob: Arc<RwLock<Glob>>) -> Response {
    log::trace!(
        "student::populate_teachers( {:?}, [ glob ] ) called.", &stud.base.uid
    );

    let glob = glob.read().await;

    let teacher_uids = match glob.db().teachers_of_student(&stud.base.uid).await {
        Ok(v) => v,
        Err(e) => { return text_500(Some(format!("{}", &e))); },
    };
    let uid_refs: Vec<&str> = teacher_uids.iter().map(|s| s.as_str()).collect();

    let (mut found, missing) = match glob.db().get_users_by_uid(&uid_refs).await {
        Ok(pair) => pair,
        Err(e) => { return text_500(Some(format!("{}", &e))); },
    };

    let teachers: Vec<BaseUser> = teacher_uids.iter()
        .filter_map(|uid| found.remove(uid))
        .collect();

    respond_action_json("populate-teachers", &TeachersData { teachers, missing })
}

async fn populate_subscriptions(stud: &Student, glob: Arc<RwLock<Glob>>) -> Response {
    log::trace!(
        "student::populate_subscriptions( {:?}, [ glob ] ) called.",
        &stud.base.uid
    );

    let glob = glob.read().await;
    match glob.db().get_subscriptions_by_student(&stud.base.uid).await {
        Ok(subs) => respond_action_json("populate-subscriptions", &subs),
        Err(e) => text_500(Some(format!("{}", &e))),
    }
}

#[derive(Debug, Deserialize)]
struct RequestData {
    teacher: String,
    class_name: String,
}

async fn request_subscription(
    stud: &Student,
    headers: &HeaderMap,
    body: Option<String>,
    glob: Arc<RwLock<Glob>>,
) -> Response {
    let body = match body {
        Some(body) => body,
        None => { return respond_bad_request(
            "Request requires a JSON body.".to_owned()
        ); },
    };

    let rd: RequestData = match serde_json::from_str(&body) {
        Ok(rd) => rd,
        Err(e) => {
            log::error!(
                "Error deserializing JSON {:?} as RequestData: {}", &body, &e
            );
            return respond_bad_request("Unable to deserialize request.".to_owned());
        },
    };

    // The identity provider's word on the student's email, passed along
    // by the front end.
    let email_verified = matches!(
        headers.get("x-hesaty-email-verified").and_then(|v| v.to_str().ok()),
        Some("true")
    );

    let glob = glob.read().await;
    match glob.db().insert_subscription(
        &stud.base.uid, &rd.teacher, &rd.class_name, email_verified
    ).await {
        Ok(id) => respond_action_json("request-subscription", &json!({ "id": id })),
        Err(e) => respond_bad_request(format!("Unable to file request: {}", &e)),
    }
}

async fn populate_homework(stud: &Student, glob: Arc<RwLock<Glob>>) -> Response {
    log::trace!(
        "student::populate_homework( {:?}, [ glob ] ) called.", &stud.base.uid
    );

    let teacher_refs: Vec<&str> = stud.teachers.iter().map(|s| s.as_str()).collect();

    let glob = glob.read().await;
    match glob.db().get_homework_for_class(&teacher_refs, &stud.class).await {
        Ok(hw) => respond_action_json("populate-homework", &hw),
        Err(e) => text_500(Some(format!("{}", &e))),
    }
}

async fn populate_results(stud: &Student, glob: Arc<RwLock<Glob>>) -> Response {
    log::trace!(
        "student::populate_results( {:?}, [ glob ] ) called.", &stud.base.uid
    );

    let glob = glob.read().await;
    match glob.db().get_results_by_student(&stud.base.uid).await {
        Ok(results) => respond_action_json("populate-results", &results),
        Err(e) => text_500(Some(format!("{}", &e))),
    }
}

async fn populate_attendance(stud: &Student, glob: Arc<RwLock<Glob>>) -> Response {
    log::trace!(
        "student::populate_attendance( {:?}, [ glob ] ) called.", &stud.base.uid
    );

    let glob = glob.read().await;
    match glob.db().get_attendance_by_student(&stud.base.uid).await {
        Ok(marks) => respond_action_json("populate-attendance", &marks),
        Err(e) => text_500(Some(format!("{}", &e))),
    }
}
