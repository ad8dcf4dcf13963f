//! Habit CRUD and lookup by id prefix or name.

use super::{format_ts, parse_ts, Store};
use chrono::Utc;
use habitual_core::{error::HabitualError, model::Habit};
use uuid::Uuid;

type HabitRow = (
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    String,
);

const HABIT_COLUMNS: &str = "id, owner_id, name, description, category, created_at";

fn habit_from_row(row: HabitRow) -> Result<Habit, HabitualError> {
    let (id, owner_id, name, description, category, created_at) = row;
    Ok(Habit {
        id,
        owner_id,
        name,
        description,
        category,
        created_at: parse_ts(&created_at)?,
    })
}

/// Field of a habit that can be edited after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HabitField {
    Name,
    Description,
    Category,
}

impl HabitField {
    fn column(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Description => "description",
            Self::Category => "category",
        }
    }
}

impl Store {
    /// Create a habit for `owner_id`.
    pub async fn create_habit(
        &self,
        owner_id: i64,
        name: &str,
        description: Option<&str>,
        category: Option<&str>,
    ) -> Result<Habit, HabitualError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HabitualError::InvalidInput(
                "habit name must not be empty".to_string(),
            ));
        }

        let habit = Habit {
            id: Uuid::new_v4().to_string(),
            owner_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            category: category.map(str::to_string),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO habits (id, owner_id, name, description, category, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&habit.id)
        .bind(habit.owner_id)
        .bind(&habit.name)
        .bind(&habit.description)
        .bind(&habit.category)
        .bind(format_ts(habit.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("create habit failed: {e}")))?;

        tracing::info!("created habit {} for {owner_id}: {}", habit.id, habit.name);
        Ok(habit)
    }

    /// Fetch a habit by its full id.
    pub async fn get_habit(&self, habit_id: &str) -> Result<Option<Habit>, HabitualError> {
        let row: Option<HabitRow> =
            sqlx::query_as(&format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?"))
                .bind(habit_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| HabitualError::Memory(format!("get habit failed: {e}")))?;

        row.map(habit_from_row).transpose()
    }

    /// All habits of an owner, oldest first.
    pub async fn list_habits(&self, owner_id: i64) -> Result<Vec<Habit>, HabitualError> {
        let rows: Vec<HabitRow> = sqlx::query_as(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE owner_id = ? ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("list habits failed: {e}")))?;

        rows.into_iter().map(habit_from_row).collect()
    }

    /// Resolve a user-supplied reference to one of the owner's habits.
    ///
    /// An exact case-insensitive name match wins; otherwise `key` is treated as
    /// an id prefix, which must be unambiguous.
    pub async fn resolve_habit(
        &self,
        owner_id: i64,
        key: &str,
    ) -> Result<Option<Habit>, HabitualError> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(None);
        }

        let by_name: Option<HabitRow> = sqlx::query_as(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits \
             WHERE owner_id = ? AND name = ? COLLATE NOCASE \
             ORDER BY created_at ASC, rowid ASC LIMIT 1"
        ))
        .bind(owner_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("resolve habit by name failed: {e}")))?;

        if let Some(row) = by_name {
            return habit_from_row(row).map(Some);
        }

        let by_prefix: Vec<HabitRow> = sqlx::query_as(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE owner_id = ? AND id LIKE ? LIMIT 2"
        ))
        .bind(owner_id)
        .bind(format!("{}%", key.replace(['%', '_'], "")))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HabitualError::Memory(format!("resolve habit by id failed: {e}")))?;

        match by_prefix.len() {
            0 => Ok(None),
            1 => by_prefix.into_iter().next().map(habit_from_row).transpose(),
            _ => Err(HabitualError::InvalidInput(format!(
                "'{key}' matches more than one habit, use a longer id"
            ))),
        }
    }

    /// Update one field of an owned habit. `None` clears optional fields.
    ///
    /// Returns `true` if a row was modified.
    pub async fn update_habit(
        &self,
        habit_id: &str,
        owner_id: i64,
        field: HabitField,
        value: Option<&str>,
    ) -> Result<bool, HabitualError> {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        if field == HabitField::Name && value.is_none() {
            return Err(HabitualError::InvalidInput(
                "habit name must not be empty".to_string(),
            ));
        }

        let sql = format!(
            "UPDATE habits SET {} = ? WHERE id = ? AND owner_id = ?",
            field.column()
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(habit_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(|e| HabitualError::Memory(format!("update habit failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete an owned habit. Completions and the reminder go with it.
    pub async fn delete_habit(&self, habit_id: &str, owner_id: i64) -> Result<bool, HabitualError> {
        let result = sqlx::query("DELETE FROM habits WHERE id = ? AND owner_id = ?")
            .bind(habit_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(|e| HabitualError::Memory(format!("delete habit failed: {e}")))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!("deleted habit {habit_id} for {owner_id}");
        }
        Ok(deleted)
    }
}
