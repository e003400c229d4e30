mod support;

use serde_json::json;
use std::time::{Duration, Instant};
use support::{temp_dir, Sidecar};

const TODAY: &str = "2026-05-11";

fn wait_for_congrats(s: &mut Sidecar, student_id: &str) -> serde_json::Value {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = s.ok("levelup.message", json!({ "studentId": student_id }));
        if status["pending"] == false && !status["message"].is_null() {
            return status;
        }
        assert!(Instant::now() < deadline, "congratulation never arrived");
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn crossing_600_pays_once_and_produces_one_congratulation() {
    let workspace = temp_dir("fitquest-level-up");
    let mut s = Sidecar::open(TODAY, &workspace);
    let id = s.create_student("가람", 3, 2, 590);

    s.ok(
        "goals.setDay",
        json!({
            "studentId": id,
            "day": TODAY,
            "goals": { "squat": { "metric": "count", "target": 10 } },
        }),
    );

    let first = s.ok(
        "activity.log",
        json!({ "studentId": id, "exerciseId": "squat", "count": 6 }),
    );
    assert_eq!(first["report"]["newlyAwarded"], json!([]));
    assert_eq!(first["report"]["totalXp"], 590);
    assert!(first["report"]["levelUp"].is_null());

    let second = s.ok(
        "activity.log",
        json!({ "studentId": id, "exerciseId": "squat", "count": 4 }),
    );
    assert_eq!(second["report"]["newlyAwarded"], json!(["squat"]));
    assert_eq!(second["report"]["totalXp"], 600);
    assert_eq!(second["report"]["level"]["name"], "체력 유망주");
    assert_eq!(second["report"]["levelUp"]["from"]["name"], "체력 꿈나무");
    assert_eq!(second["report"]["levelUp"]["to"]["name"], "체력 유망주");
    assert_eq!(second["report"]["nextThreshold"], 800);

    let status = wait_for_congrats(&mut s, &id);
    assert_eq!(status["message"]["levelName"], "체력 유망주");
    assert_eq!(status["message"]["fromFallback"], true);
    assert!(status["message"]["message"]
        .as_str()
        .expect("message text")
        .contains("가람"));

    // Further records and refreshes never pay the same goal again.
    let third = s.ok(
        "activity.log",
        json!({ "studentId": id, "exerciseId": "squat", "count": 5 }),
    );
    assert_eq!(third["report"]["newlyAwarded"], json!([]));
    assert!(third["report"]["levelUp"].is_null());
    let today = s.ok("progress.today", json!({ "studentId": id }));
    assert_eq!(today["report"]["awarded"], json!(["squat"]));
    assert_eq!(today["report"]["evaluation"]["progress"]["squat"]["achieved"], 15);
    assert_eq!(s.total_xp(&id), 600);
    s.shutdown();

    // A restarted sidecar on the same workspace sees the award as paid.
    let mut again = Sidecar::open(TODAY, &workspace);
    let today = again.ok("progress.today", json!({ "studentId": id }));
    assert_eq!(today["report"]["newlyAwarded"], json!([]));
    assert_eq!(again.total_xp(&id), 600);
    again.shutdown();
}

#[test]
fn back_dated_records_never_pay() {
    let workspace = temp_dir("fitquest-back-dated");
    let mut s = Sidecar::open(TODAY, &workspace);
    let id = s.create_student("나래", 3, 2, 100);

    s.ok(
        "goals.setDay",
        json!({
            "studentId": id,
            "day": "2026-05-10",
            "goals": { "squat": { "metric": "count", "target": 10 } },
        }),
    );
    let logged = s.ok(
        "activity.log",
        json!({
            "studentId": id,
            "exerciseId": "squat",
            "count": 30,
            "loggedAt": "2026-05-10T09:00:00",
        }),
    );
    assert!(logged["report"].is_null());
    assert_eq!(logged["record"]["loggedOn"], "2026-05-10");
    assert_eq!(s.total_xp(&id), 100);
    s.shutdown();
}

#[test]
fn editing_todays_goals_can_satisfy_existing_records() {
    let workspace = temp_dir("fitquest-goal-edit");
    let mut s = Sidecar::open(TODAY, &workspace);
    let id = s.create_student("다온", 4, 1, 0);

    s.ok(
        "rewards.update",
        json!({ "patch": { "goalXp": 25 } }),
    );
    s.ok(
        "activity.log",
        json!({ "studentId": id, "exerciseId": "plank", "durationSec": 90 }),
    );
    s.ok(
        "activity.log",
        json!({ "studentId": id, "exerciseId": "walking", "steps": 3000 }),
    );

    let set = s.ok(
        "goals.setDay",
        json!({
            "studentId": id,
            "day": TODAY,
            "goals": {
                "plank": { "metric": "duration", "target": 60 },
                "walking": { "metric": "steps", "target": 5000 },
            },
        }),
    );
    assert_eq!(set["report"]["newlyAwarded"], json!(["plank"]));
    assert_eq!(set["report"]["evaluation"]["met"], json!(["plank"]));
    assert_eq!(set["report"]["evaluation"]["progress"]["walking"]["met"], false);
    assert_eq!(s.total_xp(&id), 25);

    // Skipping an exercise drops it from evaluation but keeps the payout.
    s.ok(
        "goals.setDay",
        json!({
            "studentId": id,
            "day": TODAY,
            "goals": { "walking": { "metric": "steps", "target": 5000 } },
            "skipped": ["plank"],
        }),
    );
    assert_eq!(s.total_xp(&id), 25);
    s.shutdown();
}

#[test]
fn twenty_squats_in_one_record_meets_a_twenty_rep_goal() {
    let workspace = temp_dir("fitquest-twenty-squats");
    let mut s = Sidecar::open(TODAY, &workspace);
    let id = s.create_student("마루", 5, 3, 590);
    s.ok(
        "goals.setDay",
        json!({
            "studentId": id,
            "day": TODAY,
            "goals": { "squat": { "metric": "count", "target": 20 } },
        }),
    );
    let logged = s.ok(
        "activity.log",
        json!({ "studentId": id, "exerciseId": "squat", "count": 20 }),
    );
    assert_eq!(logged["report"]["evaluation"]["progress"]["squat"]["achieved"], 20);
    assert_eq!(logged["report"]["totalXp"], 600);
    assert_eq!(logged["report"]["levelUp"]["to"]["name"], "체력 유망주");
    let status = wait_for_congrats(&mut s, &id);
    assert_eq!(status["level"]["name"], "체력 유망주");
    s.shutdown();
}

#[test]
fn racing_sidecars_pay_a_met_goal_exactly_once() {
    let workspace = temp_dir("fitquest-award-race");
    let mut setup = Sidecar::open(TODAY, &workspace);
    let id = setup.create_student("보람", 3, 2, 0);
    setup.ok(
        "goals.setDay",
        json!({
            "studentId": id,
            "day": TODAY,
            "goals": { "squat": { "metric": "count", "target": 10 } },
        }),
    );
    setup.shutdown();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let workspace = workspace.clone();
            let id = id.clone();
            std::thread::spawn(move || {
                let mut s = Sidecar::open(TODAY, &workspace);
                s.ok(
                    "activity.log",
                    json!({ "studentId": id, "exerciseId": "squat", "count": 10 }),
                );
                for _ in 0..10 {
                    s.ok("progress.today", json!({ "studentId": id }));
                }
                s.shutdown();
            })
        })
        .collect();
    for h in handles {
        h.join().expect("award thread");
    }

    let mut check = Sidecar::open(TODAY, &workspace);
    let today = check.ok("progress.today", json!({ "studentId": id }));
    assert_eq!(today["report"]["awarded"], json!(["squat"]));
    assert_eq!(today["report"]["evaluation"]["progress"]["squat"]["achieved"], 20);
    assert_eq!(check.total_xp(&id), 10);
    check.shutdown();
}

#[test]
fn racing_sidecars_editing_different_days_keep_both() {
    let workspace = temp_dir("fitquest-goal-race");
    let mut setup = Sidecar::open(TODAY, &workspace);
    let id = setup.create_student("새롬", 3, 2, 0);
    setup.shutdown();

    let days = [("2026-05-12", "squat"), ("2026-05-13", "pushup")];
    let handles: Vec<_> = days
        .into_iter()
        .map(|(day, exercise)| {
            let workspace = workspace.clone();
            let id = id.clone();
            std::thread::spawn(move || {
                let mut s = Sidecar::open(TODAY, &workspace);
                for target in 1..=10 {
                    s.ok(
                        "goals.setDay",
                        json!({
                            "studentId": id,
                            "day": day,
                            "goals": { (exercise): { "metric": "count", "target": target } },
                        }),
                    );
                }
                s.shutdown();
            })
        })
        .collect();
    for h in handles {
        h.join().expect("goal thread");
    }

    let mut check = Sidecar::open(TODAY, &workspace);
    let all = check.ok("goals.getAll", json!({ "studentId": id }));
    let stored = all["days"].as_object().expect("days");
    assert_eq!(stored.len(), 2);
    assert_eq!(
        stored["2026-05-12"]["targets"],
        json!({ "squat": { "metric": "count", "target": 10 } })
    );
    assert_eq!(
        stored["2026-05-13"]["targets"],
        json!({ "pushup": { "metric": "count", "target": 10 } })
    );
    check.shutdown();
}
