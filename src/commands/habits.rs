//! Habit management: /add, /habits, /rename, /edit, /delete with /yes and /cancel.

use super::{args, resolve, CommandContext};
use habitual_memory::store::HabitField;
use tracing::warn;

/// Split `a | b | c` into trimmed parts, dropping empty optional fields.
fn pipe_fields(s: &str) -> Vec<&str> {
    s.split('|').map(str::trim).collect()
}

pub(super) async fn handle_add(ctx: &CommandContext<'_>) -> String {
    let fields = pipe_fields(args(ctx.text));
    let name = fields.first().copied().unwrap_or("");
    if name.is_empty() {
        return "Usage: /add name | description | category".to_string();
    }
    let description = fields.get(1).copied().filter(|s| !s.is_empty());
    let category = fields.get(2).copied().filter(|s| !s.is_empty());

    match ctx.store.resolve_habit(ctx.sender_id, name).await {
        Ok(Some(existing)) if existing.name.eq_ignore_ascii_case(name) => {
            return format!("You already track \"{}\".", existing.name);
        }
        _ => {}
    }

    match ctx
        .store
        .create_habit(ctx.sender_id, name, description, category)
        .await
    {
        Ok(habit) => format!(
            "Added \"{}\" [{}].\nMark it with /done {} or set a reminder with /remind {} HH:MM.",
            habit.name,
            habit.short_id(),
            habit.name,
            habit.name
        ),
        Err(e) => format!("Error: {e}"),
    }
}

pub(super) async fn handle_list(ctx: &CommandContext<'_>) -> String {
    let habits = match ctx.store.list_habits(ctx.sender_id).await {
        Ok(h) => h,
        Err(e) => return format!("Error: {e}"),
    };
    if habits.is_empty() {
        return "No habits yet. Add one with /add name.".to_string();
    }

    let mut out = "Your habits:\n".to_string();
    for habit in &habits {
        out.push_str(&format!("\n[{}] {}", habit.short_id(), habit.name));
        if let Some(ref category) = habit.category {
            out.push_str(&format!(" ({category})"));
        }
        if let Some(ref description) = habit.description {
            out.push_str(&format!("\n  {description}"));
        }
    }
    out
}

pub(super) async fn handle_rename(ctx: &CommandContext<'_>) -> String {
    const USAGE: &str = "Usage: /rename habit | new name";
    let rest = args(ctx.text);
    let (key, new_name) = match rest.split_once('|') {
        Some((k, n)) => (k.trim(), n.trim()),
        None => match rest.split_once(char::is_whitespace) {
            Some((k, n)) => (k.trim(), n.trim()),
            None => (rest, ""),
        },
    };
    if new_name.is_empty() {
        return USAGE.to_string();
    }
    let habit = match resolve(ctx, key, USAGE).await {
        Ok(h) => h,
        Err(reply) => return reply,
    };

    match ctx
        .store
        .update_habit(&habit.id, ctx.sender_id, HabitField::Name, Some(new_name))
        .await
    {
        Ok(true) => format!("Renamed \"{}\" to \"{new_name}\".", habit.name),
        Ok(false) => format!("No habit matching '{key}'. See /habits."),
        Err(e) => format!("Error: {e}"),
    }
}

/// `/edit habit | description|category | text`. Without text the field is cleared.
pub(super) async fn handle_edit(ctx: &CommandContext<'_>) -> String {
    const USAGE: &str = "Usage: /edit habit | description|category | text";
    // The text itself may contain '|'.
    let fields: Vec<&str> = args(ctx.text).splitn(3, '|').map(str::trim).collect();
    let (key, field_name, value) = match fields.as_slice() {
        [key, field] => (*key, *field, None),
        [key, field, value] => (*key, *field, Some(*value).filter(|v| !v.is_empty())),
        _ => return USAGE.to_string(),
    };
    let field = match field_name.to_ascii_lowercase().as_str() {
        "description" | "desc" => HabitField::Description,
        "category" | "cat" => HabitField::Category,
        "name" => HabitField::Name,
        _ => return USAGE.to_string(),
    };
    if field == HabitField::Name && value.is_none() {
        return "A habit needs a name.".to_string();
    }
    let habit = match resolve(ctx, key, USAGE).await {
        Ok(h) => h,
        Err(reply) => return reply,
    };

    let label = field_name.to_ascii_lowercase();
    match ctx
        .store
        .update_habit(&habit.id, ctx.sender_id, field, value)
        .await
    {
        Ok(true) => match value {
            Some(v) => format!("Updated {label} of \"{}\": {v}", habit.name),
            None => format!("Cleared {label} of \"{}\".", habit.name),
        },
        Ok(false) => format!("No habit matching '{key}'. See /habits."),
        Err(e) => format!("Error: {e}"),
    }
}

pub(super) async fn handle_delete(ctx: &CommandContext<'_>) -> String {
    let habit = match resolve(ctx, args(ctx.text), "Usage: /delete habit").await {
        Ok(h) => h,
        Err(reply) => return reply,
    };
    ctx.conversations
        .begin_delete(ctx.sender_id, &habit.id, &habit.name);
    format!(
        "Delete \"{}\" with all its history and its reminder? Send /yes to confirm or /cancel.",
        habit.name
    )
}

pub(super) async fn handle_confirm(ctx: &CommandContext<'_>) -> String {
    let Some(pending) = ctx.conversations.confirm_delete(ctx.sender_id) else {
        return "Nothing to confirm.".to_string();
    };

    match ctx
        .store
        .delete_habit(&pending.habit_id, ctx.sender_id)
        .await
    {
        Ok(true) => {
            ctx.scheduler.remove(&pending.habit_id).await;
            format!("Deleted \"{}\".", pending.habit_name)
        }
        Ok(false) => format!("\"{}\" no longer exists.", pending.habit_name),
        Err(e) => {
            warn!("delete of habit {} failed: {e}", pending.habit_id);
            format!("Error: {e}")
        }
    }
}

pub(super) fn handle_cancel(ctx: &CommandContext<'_>) -> String {
    if ctx.conversations.cancel(ctx.sender_id) {
        "Cancelled.".to_string()
    } else {
        "Nothing to cancel.".to_string()
    }
}
