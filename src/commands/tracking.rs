//! Daily tracking and reports: /today, /done, /skip, /undo, /history, /stats.

use super::{args, resolve, CommandContext};
use habitual_core::model::{CompletionOutcome, CompletionStatus, DayStatus};

const HISTORY_PAGE: u32 = 10;
const MAX_STATS_WINDOW: u32 = 366;

fn status_mark(status: DayStatus) -> &'static str {
    match status {
        DayStatus::Done => "[x]",
        DayStatus::Skipped => "[-]",
        DayStatus::Pending => "[ ]",
    }
}

pub(super) async fn handle_today(ctx: &CommandContext<'_>) -> String {
    let today = ctx.stats.today();
    let statuses = match ctx.store.statuses_on(ctx.sender_id, today).await {
        Ok(s) => s,
        Err(e) => return format!("Error: {e}"),
    };
    if statuses.is_empty() {
        return "No habits yet. Add one with /add name.".to_string();
    }

    let done = statuses
        .iter()
        .filter(|(_, s)| *s == DayStatus::Done)
        .count();
    let mut out = format!("Today, {today}: {done}/{} done\n", statuses.len());
    for (habit, status) in &statuses {
        out.push_str(&format!("\n{} {}", status_mark(*status), habit.name));
    }
    out
}

/// `/done`, `/skip` (with a status) and `/undo` (without).
pub(super) async fn handle_mark(ctx: &CommandContext<'_>, status: Option<CompletionStatus>) -> String {
    let usage = match status {
        Some(CompletionStatus::Done) => "Usage: /done habit",
        Some(CompletionStatus::Skipped) => "Usage: /skip habit",
        None => "Usage: /undo habit",
    };
    let habit = match resolve(ctx, args(ctx.text), usage).await {
        Ok(h) => h,
        Err(reply) => return reply,
    };
    let today = ctx.stats.today();

    let Some(status) = status else {
        return match ctx.store.clear_completion(&habit.id, today).await {
            Ok(true) => format!("\"{}\" is pending again for today.", habit.name),
            Ok(false) => format!("\"{}\" was not marked today.", habit.name),
            Err(e) => format!("Error: {e}"),
        };
    };

    match ctx.store.record_completion(&habit.id, today, status).await {
        Ok(CompletionOutcome::Recorded) => match status {
            CompletionStatus::Done => format!("Nice! \"{}\" done for today.", habit.name),
            CompletionStatus::Skipped => format!("\"{}\" skipped for today.", habit.name),
        },
        Ok(CompletionOutcome::Unchanged) => {
            format!("\"{}\" was already marked {} today.", habit.name, status.as_str())
        }
        Err(e) => format!("Error: {e}"),
    }
}

pub(super) async fn handle_history(ctx: &CommandContext<'_>) -> String {
    let key = args(ctx.text);
    let habit = if key.is_empty() {
        None
    } else {
        match resolve(ctx, key, "").await {
            Ok(h) => Some(h),
            Err(reply) => return reply,
        }
    };
    let habit_id = habit.as_ref().map(|h| h.id.as_str());

    let records = match ctx
        .store
        .history(ctx.sender_id, habit_id, HISTORY_PAGE, 0)
        .await
    {
        Ok(r) => r,
        Err(e) => return format!("Error: {e}"),
    };
    if records.is_empty() {
        return "No history yet.".to_string();
    }
    let total = ctx
        .store
        .history_count(ctx.sender_id, habit_id)
        .await
        .unwrap_or(records.len() as u64);

    let mut out = match &habit {
        Some(h) => format!("History of \"{}\":\n", h.name),
        None => "Recent history:\n".to_string(),
    };
    for record in &records {
        let mark = status_mark(DayStatus::from(Some(record.status)));
        out.push_str(&format!("\n{} {mark} {}", record.date, record.habit_name));
    }
    if total > records.len() as u64 {
        out.push_str(&format!("\n\nShowing {} of {total}.", records.len()));
    }
    out
}

pub(super) async fn handle_stats(ctx: &CommandContext<'_>) -> String {
    let arg = args(ctx.text);
    let window = if arg.is_empty() {
        ctx.stats_window_days
    } else {
        match arg.parse::<u32>() {
            Ok(d) if (1..=MAX_STATS_WINDOW).contains(&d) => d,
            _ => return format!("Usage: /stats [days], days between 1 and {MAX_STATS_WINDOW}"),
        }
    };

    let all = match ctx.stats.compute_for_owner(ctx.sender_id, window).await {
        Ok(s) => s,
        Err(e) => return format!("Error: {e}"),
    };
    if all.is_empty() {
        return "No habits yet. Add one with /add name.".to_string();
    }

    let mut out = format!("Last {window} days:\n");
    for (name, s) in &all {
        out.push_str(&format!(
            "\n{name}: {:.0}% ({}/{}), streak {}, best {}",
            s.completion_rate * 100.0,
            s.done_count,
            s.window_days,
            s.current_streak,
            s.longest_streak
        ));
    }
    out
}
