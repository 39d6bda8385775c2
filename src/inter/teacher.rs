/*!
Subcrate for interoperation with Teacher users.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::header::HeaderMap,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::Date;
use tokio::sync::RwLock;

use crate::{
    DATE_FMT,
    config::Glob,
    records::{Attendance, ExamResult, Homework},
    user::*,
};
use super::*;

pub async fn api(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: Option<String>,
) -> Response {
    let teach = match requesting_user(&headers, &glob).await {
        Ok(User::Teacher(teach)) => teach,
        Ok(_) => { return respond_forbidden(); },
        Err(resp) => { return resp; },
    };

    let action = match action_header(&headers) {
        Ok(act) => act,
        Err(resp) => { return resp; },
    };

    match action {
        "populate-roster" => populate_roster(&teach, glob.clone()).await,
        "populate-subscriptions" => populate_subscriptions(&teach, glob.clone()).await,
        "approve-subscription" => review_subscription(&teach, body, glob.clone(), true).await,
        "reject-subscription" => review_subscription(&teach, body, glob.clone(), false).await,
        "record-attendance" => record_attendance(&teach, body, glob.clone()).await,
        "add-homework" => add_homework(&teach, body, glob.clone()).await,
        "populate-homework" => populate_homework(&teach, glob.clone()).await,
        "record-results" => record_results(&teach, body, glob.clone()).await,
        x => respond_bad_request(
            format!("{:?} is not a recognized x-hesaty-action value.", &x)
        ),
    }
}

#[derive(Debug, Serialize)]
struct RosterData {
    students: Vec<BaseUser>,
    /// uids the enrollment table names but the users table doesn't: a
    /// dangling reference is reported as such, not shown as an empty
    /// roster.
    missing: Vec<String>,
}

async fn populate_roster(teach: &Teacher, glob: Arc<RwLock<Glob>>) -> Response {
    log::trace!("teacher::populate_roster( {:?}, [ glob ] ) called.", &teach.base.uid);

    let glob = glob.read().await;

    let roster_uids = match glob.db().students_of_teacher(&teach.base.uid).await {
        Ok(v) => v,
        Err(e) => { return text_500(Some(format!("{}", &e))); },
    };
    let uid_refs: Vec<&str> = roster_uids.iter().map(|s| s.as_str()).collect();

    let (mut found, missing) = match glob.db().get_users_by_uid(&uid_refs).await {
        Ok(pair) => pair,
        Err(e) => { return text_500(Some(format!("{}", &e))); },
    };

    // Preserve enrollment order.
    let students: Vec<BaseUser> = roster_uids.iter()
        .filter_map(|uid| found.remove(uid))
        .collect();

    respond_action_json("populate-roster", &RosterData { students, missing })
}

async fn populate_subscriptions(teach: &Teacher, glob: Arc<RwLock<Glob>>) -> Response {
    log::trace!(
        "teacher::populate_subscriptions( {:?}, [ glob ] ) called.",
        &teach.base.uid
    );

    let glob = glob.read().await;
    let subs = match glob.db().get_subscriptions_by_teacher(
        &teach.base.uid, None
    ).await {
        Ok(subs) => subs,
        Err(e) => { return text_500(Some(format!("{}", &e))); },
    };

    respond_action_json("populate-subscriptions", &subs)
}

#[derive(Debug, Deserialize)]
struct ReviewData {
    id: i64,
    #[serde(default)]
    reason: Option<String>,
}

async fn review_subscription(
    teach: &Teacher,
    body: Option<String>,
    glob: Arc<RwLock<Glob>>,
    approve: bool,
) -> Response {
    let body = match body {
        Some(body) => body,
        None => { return respond_bad_request(
            "Request requires a JSON body.".to_owned()
        ); },
    };

    let rd: ReviewData = match serde_json::from_str(&body) {
        Ok(rd) => rd,
        Err(e) => {
            log::error!("Error deserializing JSON {:?} as ReviewData: {}", &body, &e);
            return respond_bad_request("Unable to deserialize review.".to_owned());
        },
    };

    // Teachers only review their own requests.
    {
        let glob = glob.read().await;
        match glob.db().get_subscription_by_id(rd.id).await {
            Ok(Some(sub)) if sub.teacher == teach.base.uid => {},
            Ok(Some(_)) => { return respond_forbidden(); },
            Ok(None) => {
                return respond_bad_request(format!(
                    "There is no subscription with id {}.", &rd.id
                ));
            },
            Err(e) => { return text_500(Some(format!("{}", &e))); },
        }
    }

    {
        let mut glob = glob.write().await;

        let res = if approve {
            glob.db().approve_subscription(rd.id, &teach.base.uid).await
        } else {
            let reason = rd.reason.as_deref().unwrap_or("");
            glob.db().reject_subscription(rd.id, &teach.base.uid, reason).await
        };
        if let Err(e) = res {
            log::error!(
                "Error reviewing subscription {} (approve = {}): {}",
                &rd.id, &approve, &e
            );
            return respond_bad_request(format!("Unable to review: {}", &e));
        }

        // Approval may have enrolled a student; the cache must follow.
        if let Err(e) = glob.refresh_users().await {
            log::error!("Error refreshing user cache from database: {}", &e);
            return text_500(Some("Unable to reread users from database.".to_owned()));
        }
    }

    let glob = glob.read().await;
    match glob.db().get_subscription_by_id(rd.id).await {
        Ok(Some(sub)) => respond_action_json("update-subscription", &sub),
        Ok(None) => text_500(None),
        Err(e) => text_500(Some(format!("{}", &e))),
    }
}

#[derive(Debug, Deserialize)]
struct AttendanceData {
    student: String,
    day: String,
    present: bool,
}

async fn record_attendance(
    teach: &Teacher,
    body: Option<String>,
    glob: Arc<RwLock<Glob>>,
) -> Response {
    let body = match body {
        Some(body) => body,
        None => { return respond_bad_request(
            "Request requires a JSON body.".to_owned()
        ); },
    };

    let data: Vec<AttendanceData> = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(e) => {
            log::error!(
                "Error deserializing JSON {:?} as attendance marks: {}",
                &body, &e
            );
            return respond_bad_request("Unable to deserialize attendance.".to_owned());
        },
    };

    let mut marks: Vec<Attendance> = Vec::with_capacity(data.len());
    for d in data.iter() {
        if !teach.students.iter().any(|s| s == &d.student) {
            return respond_bad_request(format!(
                "Student {:?} is not enrolled with you.", &d.student
            ));
        }
        let day = match Date::parse(&d.day, DATE_FMT) {
            Ok(day) => day,
            Err(e) => {
                return respond_bad_request(format!(
                    "Unparseable day {:?}: {}", &d.day, &e
                ));
            },
        };
        marks.push(Attendance {
            student: d.student.clone(),
            teacher: teach.base.uid.clone(),
            day,
            present: d.present,
        });
    }

    let glob = glob.read().await;
    match glob.db().record_attendance(&marks).await {
        Ok(n) => respond_action_json("record-attendance", &json!({ "recorded": n })),
        Err(e) => text_500(Some(format!("Unable to record attendance: {}", &e))),
    }
}

#[derive(Debug, Deserialize)]
struct HomeworkData {
    class: String,
    title: String,
    #[serde(default)]
    due: Option<String>,
}

async fn add_homework(
    teach: &Teacher,
    body: Option<String>,
    glob: Arc<RwLock<Glob>>,
) -> Response {
    let body = match body {
        Some(body) => body,
        None => { return respond_bad_request(
            "Request requires a JSON body.".to_owned()
        ); },
    };

    let hd: HomeworkData = match serde_json::from_str(&body) {
        Ok(hd) => hd,
        Err(e) => {
            log::error!("Error deserializing JSON {:?} as HomeworkData: {}", &body, &e);
            return respond_bad_request("Unable to deserialize homework.".to_owned());
        },
    };

    let due = match hd.due.as_deref() {
        None => None,
        Some(s) => match Date::parse(s, DATE_FMT) {
            Ok(d) => Some(d),
            Err(e) => {
                return respond_bad_request(format!(
                    "Unparseable due date {:?}: {}", s, &e
                ));
            },
        },
    };

    let hw = Homework {
        id: 0,
        teacher: teach.base.uid.clone(),
        class: hd.class,
        title: hd.title,
        due,
    };

    let glob = glob.read().await;
    match glob.db().insert_homework(&hw).await {
        Ok(id) => respond_action_json("add-homework", &json!({ "id": id })),
        Err(e) => text_500(Some(format!("Unable to insert homework: {}", &e))),
    }
}

async fn populate_homework(teach: &Teacher, glob: Arc<RwLock<Glob>>) -> Response {
    log::trace!(
        "teacher::populate_homework( {:?}, [ glob ] ) called.", &teach.base.uid
    );

    let glob = glob.read().await;
    match glob.db().get_homework_by_teacher(&teach.base.uid).await {
        Ok(hw) => respond_action_json("populate-homework", &hw),
        Err(e) => text_500(Some(format!("{}", &e))),
    }
}

#[derive(Debug, Deserialize)]
struct ResultData {
    student: String,
    exam: String,
    score: f32,
    #[serde(default)]
    taken: Option<String>,
}

async fn record_results(
    teach: &Teacher,
    body: Option<String>,
    glob: Arc<RwLock<Glob>>,
) -> Response {
    let body = match body {
        Some(body) => body,
        None => { return respond_bad_request(
            "Request requires a JSON body.".to_owned()
        ); },
    };

    let data: Vec<ResultData> = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(e) => {
            log::error!(
                "Error deserializing JSON {:?} as exam results: {}", &body, &e
            );
            return respond_bad_request("Unable to deserialize results.".to_owned());
        },
    };

    let mut results: Vec<ExamResult> = Vec::with_capacity(data.len());
    for d in data.into_iter() {
        if !teach.students.iter().any(|s| s == &d.student) {
            return respond_bad_request(format!(
                "Student {:?} is not enrolled with you.", &d.student
            ));
        }
        let taken = match d.taken.as_deref() {
            None => None,
            Some(s) => match Date::parse(s, DATE_FMT) {
                Ok(day) => Some(day),
                Err(e) => {
                    return respond_bad_request(format!(
                        "Unparseable exam date {:?}: {}", s, &e
                    ));
                },
            },
        };
        results.push(ExamResult {
            id: 0,
            student: d.student,
            teacher: teach.base.uid.clone(),
            exam: d.exam,
            score: d.score,
            taken,
        });
    }

    let glob = glob.read().await;
    match glob.db().insert_results(&results).await {
        Ok(n) => respond_action_json("record-results", &json!({ "recorded": n })),
        Err(e) => text_500(Some(format!("Unable to record results: {}", &e))),
    }
}
