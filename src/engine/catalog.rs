use crate::engine::error::{EngineError, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A measured quantity an exercise can be logged and targeted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Count,
    Duration,
    Steps,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Count => "count",
            Metric::Duration => "duration",
            Metric::Steps => "steps",
        }
    }

    pub fn parse(s: &str) -> Option<Metric> {
        match s {
            "count" => Some(Metric::Count),
            "duration" => Some(Metric::Duration),
            "steps" => Some(Metric::Steps),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Strength,
    Cardio,
    Flexibility,
    Walking,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Strength => "strength",
            Category::Cardio => "cardio",
            Category::Flexibility => "flexibility",
            Category::Walking => "walking",
        }
    }

    pub fn parse(s: &str) -> Option<Category> {
        match s {
            "strength" => Some(Category::Strength),
            "cardio" => Some(Category::Cardio),
            "flexibility" => Some(Category::Flexibility),
            "walking" => Some(Category::Walking),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub units: Vec<Metric>,
}

impl Exercise {
    pub fn declares(&self, metric: Metric) -> bool {
        self.units.contains(&metric)
    }
}

fn units_from_flags(count: bool, duration: bool, steps: bool) -> Vec<Metric> {
    let mut units = Vec::with_capacity(3);
    if count {
        units.push(Metric::Count);
    }
    if duration {
        units.push(Metric::Duration);
    }
    if steps {
        units.push(Metric::Steps);
    }
    units
}

fn row_to_exercise(r: &rusqlite::Row<'_>) -> rusqlite::Result<Exercise> {
    let category: String = r.get(2)?;
    Ok(Exercise {
        id: r.get(0)?,
        name: r.get(1)?,
        category: Category::parse(&category).unwrap_or(Category::Strength),
        units: units_from_flags(
            r.get::<_, i64>(3)? != 0,
            r.get::<_, i64>(4)? != 0,
            r.get::<_, i64>(5)? != 0,
        ),
    })
}

pub fn list(conn: &Connection) -> Result<Vec<Exercise>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, has_count, has_duration, has_steps
         FROM exercises
         ORDER BY sort_order, id",
    )?;
    let rows = stmt
        .query_map([], row_to_exercise)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, exercise_id: &str) -> Result<Option<Exercise>> {
    let ex = conn
        .query_row(
            "SELECT id, name, category, has_count, has_duration, has_steps
             FROM exercises WHERE id = ?",
            [exercise_id],
            row_to_exercise,
        )
        .optional()?;
    Ok(ex)
}

pub fn upsert(conn: &Connection, exercise: &Exercise) -> Result<()> {
    let id = exercise.id.trim();
    if id.is_empty() {
        return Err(EngineError::bad_input("exercise id must not be empty"));
    }
    if exercise.name.trim().is_empty() {
        return Err(EngineError::bad_input("exercise name must not be empty"));
    }
    if exercise.units.is_empty() {
        return Err(EngineError::bad_input("exercise must declare at least one unit"));
    }
    let next_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM exercises",
        [],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO exercises(id, name, category, has_count, has_duration, has_steps, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           category = excluded.category,
           has_count = excluded.has_count,
           has_duration = excluded.has_duration,
           has_steps = excluded.has_steps",
        (
            id,
            exercise.name.trim(),
            exercise.category.as_str(),
            exercise.declares(Metric::Count) as i64,
            exercise.declares(Metric::Duration) as i64,
            exercise.declares(Metric::Steps) as i64,
            next_order,
        ),
    )?;
    Ok(())
}
