//! Reminder commands: /remind, /unremind, /pause, /resume, /reminders.

use super::{args, resolve, CommandContext};
use chrono::{DateTime, Utc};
use habitual_core::{error::HabitualError, model::parse_time_of_day};
use tracing::warn;

fn local(ctx: &CommandContext<'_>, t: DateTime<Utc>) -> String {
    t.with_timezone(&ctx.tz).format("%a %d %b %H:%M").to_string()
}

pub(super) async fn handle_remind(ctx: &CommandContext<'_>) -> String {
    const USAGE: &str = "Usage: /remind habit HH:MM";
    let rest = args(ctx.text);
    let Some((key, time)) = rest.rsplit_once(char::is_whitespace) else {
        return USAGE.to_string();
    };
    let (hour, minute) = match parse_time_of_day(time) {
        Ok(hm) => hm,
        Err(HabitualError::InvalidInput(msg)) => return format!("{msg}. {USAGE}"),
        Err(e) => return format!("Error: {e}"),
    };
    let habit = match resolve(ctx, key.trim(), USAGE).await {
        Ok(h) => h,
        Err(reply) => return reply,
    };

    let reminder = match ctx.store.set_reminder(&habit.id, hour, minute).await {
        Ok(r) => r,
        Err(e) => return format!("Error: {e}"),
    };
    match ctx.scheduler.upsert(&reminder).await {
        Ok(Some(next)) => format!(
            "Reminder for \"{}\" set at {hour:02}:{minute:02} daily. Next: {} ({}).",
            habit.name,
            local(ctx, next),
            ctx.tz
        ),
        Ok(None) => format!(
            "Reminder for \"{}\" saved at {hour:02}:{minute:02}, but reminders are turned off on this bot.",
            habit.name
        ),
        Err(e) => {
            warn!("arming reminder for {} failed: {e}", habit.id);
            format!("Reminder saved, but it could not be scheduled: {e}")
        }
    }
}

pub(super) async fn handle_unremind(ctx: &CommandContext<'_>) -> String {
    let habit = match resolve(ctx, args(ctx.text), "Usage: /unremind habit").await {
        Ok(h) => h,
        Err(reply) => return reply,
    };
    match ctx.store.remove_reminder(&habit.id).await {
        Ok(true) => {
            ctx.scheduler.remove(&habit.id).await;
            format!("Reminder for \"{}\" removed.", habit.name)
        }
        Ok(false) => format!("\"{}\" has no reminder.", habit.name),
        Err(e) => format!("Error: {e}"),
    }
}

/// `/pause` and `/resume`: keep the configured time, flip the switch.
pub(super) async fn handle_toggle(ctx: &CommandContext<'_>, enabled: bool) -> String {
    let usage = if enabled {
        "Usage: /resume habit"
    } else {
        "Usage: /pause habit"
    };
    let habit = match resolve(ctx, args(ctx.text), usage).await {
        Ok(h) => h,
        Err(reply) => return reply,
    };

    match ctx.store.set_reminder_enabled(&habit.id, enabled).await {
        Ok(true) => {}
        Ok(false) => {
            return format!(
                "\"{}\" has no reminder. Set one with /remind {} HH:MM.",
                habit.name, habit.name
            )
        }
        Err(e) => return format!("Error: {e}"),
    }

    let armed = match ctx.store.get_reminder(&habit.id).await {
        Ok(Some(reminder)) => ctx.scheduler.upsert(&reminder).await,
        Ok(None) => {
            ctx.scheduler.remove(&habit.id).await;
            Ok(None)
        }
        Err(e) => Err(e),
    };
    if let Err(ref e) = armed {
        warn!("rescheduling reminder for {} failed: {e}", habit.id);
    }

    match (enabled, armed) {
        (false, _) => format!("Reminder for \"{}\" paused.", habit.name),
        (true, Ok(Some(next))) => format!(
            "Reminder for \"{}\" resumed. Next: {}.",
            habit.name,
            local(ctx, next)
        ),
        (true, _) => format!("Reminder for \"{}\" resumed.", habit.name),
    }
}

pub(super) async fn handle_list(ctx: &CommandContext<'_>) -> String {
    let reminders = match ctx.store.reminders_for_owner(ctx.sender_id).await {
        Ok(r) => r,
        Err(e) => return format!("Error: {e}"),
    };
    if reminders.is_empty() {
        return "No reminders. Set one with /remind habit HH:MM.".to_string();
    }
    let habits = match ctx.store.list_habits(ctx.sender_id).await {
        Ok(h) => h,
        Err(e) => return format!("Error: {e}"),
    };

    let mut out = format!("Reminders ({}):\n", ctx.tz);
    for reminder in &reminders {
        let name = habits
            .iter()
            .find(|h| h.id == reminder.habit_id)
            .map(|h| h.name.as_str())
            .unwrap_or("?");
        let state = if reminder.enabled { "" } else { " (paused)" };
        out.push_str(&format!(
            "\n{:02}:{:02} {name}{state}",
            reminder.hour, reminder.minute
        ));
        if let Some(ref err) = reminder.last_error {
            out.push_str(&format!("\n  last delivery failed: {err}"));
        }
    }
    out
}
