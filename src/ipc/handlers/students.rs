use crate::engine::students::{self, NewStudent, Student};
use crate::ipc::helpers::{
    get_optional_i64, get_optional_str, get_required_i64, get_required_str, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn student_json(s: &Student) -> serde_json::Value {
    let level = s.level();
    json!({
        "id": s.id,
        "name": s.name,
        "grade": s.grade,
        "section": s.section,
        "gender": s.gender,
        "avatar": s.avatar,
        "totalXp": s.total_xp,
        "level": level,
    })
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let clock = state.clock.clone();
    with_db(state, req, |conn, params| {
        let new = NewStudent {
            name: get_required_str(params, "name")?,
            grade: get_required_i64(params, "grade")?,
            section: get_required_i64(params, "section")?,
            gender: get_optional_str(params, "gender")?.unwrap_or_default(),
            pin: get_required_str(params, "pin")?,
            avatar: get_optional_str(params, "avatar")?,
            initial_xp: get_optional_i64(params, "initialXp")?.unwrap_or(0),
        };
        let created = students::create(conn, clock.as_ref(), &new)?;
        Ok(json!({ "studentId": created.id, "student": student_json(&created) }))
    })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let grade = get_optional_i64(params, "grade")?;
        let section = get_optional_i64(params, "section")?;
        let rows = students::list(conn, grade, section)?;
        let list: Vec<_> = rows.iter().map(student_json).collect();
        Ok(json!({ "students": list }))
    })
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let s = students::require(conn, &student_id)?;
        Ok(json!({ "student": student_json(&s) }))
    })
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        students::delete(conn, &student_id)?;
        Ok(json!({ "ok": true }))
    })
}

fn handle_students_verify_pin(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let student_id = get_required_str(params, "studentId")?;
        let pin = params
            .get("pin")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("missing pin"))?;
        let matched = students::verify_pin(conn, &student_id, pin)?;
        Ok(json!({ "valid": matched }))
    })
}

fn handle_students_ranking(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, params| {
        let grade = get_required_i64(params, "grade")?;
        let section = get_required_i64(params, "section")?;
        let rows = students::ranking(conn, grade, section)?;
        let ranking: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut v = student_json(s);
                v["rank"] = json!(i + 1);
                v
            })
            .collect();
        Ok(json!({ "ranking": ranking }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.verifyPin" => Some(handle_students_verify_pin(state, req)),
        "students.ranking" => Some(handle_students_ranking(state, req)),
        _ => None,
    }
}
