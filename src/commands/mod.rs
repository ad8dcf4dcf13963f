//! Bot commands: parsing and dispatch to the handlers.

mod habits;
mod reminders;
mod tracking;


use crate::gateway::access::{AccessDecision, AccessGate};
use crate::gateway::conversation::Conversations;
use chrono_tz::Tz;
use habitual_core::{
    error::HabitualError,
    model::{CompletionStatus, Habit},
};
use habitual_engine::{Scheduler, Stats};
use habitual_memory::Store;

/// Everything a command handler may touch.
pub struct CommandContext<'a> {
    pub store: &'a Store,
    pub scheduler: &'a Scheduler,
    pub stats: &'a Stats,
    pub conversations: &'a Conversations,
    pub access: &'a AccessGate,
    pub sender_id: i64,
    pub text: &'a str,
    pub tz: Tz,
    pub stats_window_days: u32,
}

/// Known bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Add,
    Habits,
    Today,
    Done,
    Skip,
    Undo,
    History,
    Stats,
    Remind,
    Unremind,
    Pause,
    Resume,
    Reminders,
    Rename,
    Edit,
    Delete,
    Yes,
    Cancel,
    RefreshMembership,
}

impl Command {
    /// Parse a command from message text. `None` for plain text and unknown
    /// `/` commands.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        // Strip @botname suffix (e.g. "/help@habitual_bot" → "/help").
        let cmd = first.split('@').next().unwrap_or(first);
        match cmd {
            "/start" => Some(Self::Start),
            "/help" => Some(Self::Help),
            "/add" | "/new" => Some(Self::Add),
            "/habits" | "/list" => Some(Self::Habits),
            "/today" => Some(Self::Today),
            "/done" => Some(Self::Done),
            "/skip" => Some(Self::Skip),
            "/undo" => Some(Self::Undo),
            "/history" => Some(Self::History),
            "/stats" => Some(Self::Stats),
            "/remind" => Some(Self::Remind),
            "/unremind" => Some(Self::Unremind),
            "/pause" => Some(Self::Pause),
            "/resume" => Some(Self::Resume),
            "/reminders" => Some(Self::Reminders),
            "/rename" => Some(Self::Rename),
            "/edit" => Some(Self::Edit),
            "/delete" => Some(Self::Delete),
            "/yes" => Some(Self::Yes),
            "/cancel" => Some(Self::Cancel),
            "/refresh_membership" | "/refresh" => Some(Self::RefreshMembership),
            _ => None,
        }
    }

    /// Whether the access gate must pass before the command runs.
    pub fn requires_membership(self) -> bool {
        !matches!(self, Self::Start | Self::Help | Self::RefreshMembership)
    }
}

/// Text after the command word, trimmed.
pub(crate) fn args(text: &str) -> &str {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(i) => text[i..].trim(),
        None => "",
    }
}

/// Resolve a habit reference or produce the reply explaining why not.
pub(crate) async fn resolve(
    ctx: &CommandContext<'_>,
    key: &str,
    usage: &str,
) -> Result<Habit, String> {
    if key.is_empty() {
        return Err(usage.to_string());
    }
    match ctx.store.resolve_habit(ctx.sender_id, key).await {
        Ok(Some(habit)) => Ok(habit),
        Ok(None) => Err(format!("No habit matching '{key}'. See /habits.")),
        Err(HabitualError::InvalidInput(msg)) => Err(msg),
        Err(e) => Err(format!("Error: {e}")),
    }
}

const HELP: &str = "\
Habits
/add name | description | category - add a habit
/habits - list your habits
/rename habit | new name - rename a habit
/edit habit | description|category | text - change or clear a field
/delete habit - delete a habit and its history

Tracking
/today - today's status
/done habit - mark done today
/skip habit - mark skipped today
/undo habit - clear today's mark
/history [habit] - recent records
/stats [days] - completion rate and streaks

Reminders
/remind habit HH:MM - daily reminder
/unremind habit - remove the reminder
/pause habit, /resume habit - turn it off and on
/reminders - list reminders

/cancel - cancel a pending action
/refresh_membership - re-check channel membership

A habit can be named by its name or by the id shown in /habits.";

/// Handle a command and return the response text.
pub async fn handle(cmd: Command, ctx: &CommandContext<'_>) -> String {
    match cmd {
        Command::Start => format!("Welcome! I help you build daily habits.\n\n{HELP}"),
        Command::Help => HELP.to_string(),
        Command::Add => habits::handle_add(ctx).await,
        Command::Habits => habits::handle_list(ctx).await,
        Command::Rename => habits::handle_rename(ctx).await,
        Command::Edit => habits::handle_edit(ctx).await,
        Command::Delete => habits::handle_delete(ctx).await,
        Command::Yes => habits::handle_confirm(ctx).await,
        Command::Cancel => habits::handle_cancel(ctx),
        Command::Today => tracking::handle_today(ctx).await,
        Command::Done => tracking::handle_mark(ctx, Some(CompletionStatus::Done)).await,
        Command::Skip => tracking::handle_mark(ctx, Some(CompletionStatus::Skipped)).await,
        Command::Undo => tracking::handle_mark(ctx, None).await,
        Command::History => tracking::handle_history(ctx).await,
        Command::Stats => tracking::handle_stats(ctx).await,
        Command::Remind => reminders::handle_remind(ctx).await,
        Command::Unremind => reminders::handle_unremind(ctx).await,
        Command::Pause => reminders::handle_toggle(ctx, false).await,
        Command::Resume => reminders::handle_toggle(ctx, true).await,
        Command::Reminders => reminders::handle_list(ctx).await,
        Command::RefreshMembership => handle_refresh_membership(ctx).await,
    }
}

async fn handle_refresh_membership(ctx: &CommandContext<'_>) -> String {
    if !ctx.access.is_enabled() {
        return "Membership check is not enabled.".to_string();
    }
    match ctx.access.refresh(ctx.sender_id).await {
        AccessDecision::Granted => "Membership confirmed. You're all set!".to_string(),
        other => ctx.access.denial_text(&other),
    }
}
