//! Prompt builders for the LLM-backed planner.
//!
//! The roster block lists EXACT email addresses and chat handles so the
//! model schedules communications the hub can resolve; anything it invents
//! outside the roster is rejected downstream.

use officesim_core::locale::Locale;
use officesim_core::types::Person;

use crate::client::ChatMessage;
use crate::planner::{
    DailyPlanContext, DailyReportContext, HourlyPlanContext, HourlySummaryContext,
    ProjectPlanContext, SimulationReportContext,
};

fn language_line(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Write in natural workplace English.",
        Locale::Ko => "자연스러운 업무용 한국어로 작성하세요.",
    }
}

fn roster_block(team: &[Person]) -> String {
    let mut out = String::from("Team roster (use these EXACT addresses and handles):\n");
    for member in team {
        out.push_str(&format!(
            "- {} ({}) — email: {}, chat: @{}\n",
            member.name, member.role, member.email_address, member.chat_handle
        ));
    }
    out
}

pub fn project_plan_messages(ctx: &ProjectPlanContext<'_>, locale: Locale) -> Vec<ChatMessage> {
    let system = format!(
        "You are {}, the department head, drafting a project plan. {}",
        ctx.department_head.name,
        language_line(locale)
    );
    let user = format!(
        "Project: {}\nSummary: {}\nDuration: {} week(s)\n\n{}\n\
         Produce a week-by-week plan with milestones, owners, and communication checkpoints.",
        ctx.project_name,
        ctx.project_summary,
        ctx.duration_weeks,
        roster_block(ctx.team),
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn daily_plan_messages(ctx: &DailyPlanContext<'_>, locale: Locale) -> Vec<ChatMessage> {
    let system = format!(
        "{}\n\nYou are planning your own workday. {}",
        ctx.worker.persona_markdown,
        language_line(locale)
    );
    let total_days = ctx.duration_weeks.max(1) * 5;
    let user = format!(
        "Project plan:\n{}\n\nDay {} of {}.\n{}\n\
         List the goals for today as short bullets, ending with what to capture for the end-of-day report.",
        ctx.project_plan,
        ctx.day_index + 1,
        total_days,
        roster_block(ctx.team),
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn hourly_plan_messages(ctx: &HourlyPlanContext<'_>, locale: Locale) -> Vec<ChatMessage> {
    let system = format!(
        "{}\n\nYou are planning your next working hour. {}",
        ctx.worker.persona_markdown,
        language_line(locale)
    );

    let mut user = format!(
        "Project plan:\n{}\n\nToday's plan:\n{}\n\nTick {} ({}).\n{}",
        ctx.project_plan,
        ctx.daily_plan,
        ctx.tick,
        ctx.reason,
        roster_block(ctx.team),
    );

    if let Some(projects) = ctx.all_active_projects {
        if projects.len() > 1 {
            user.push_str("\nYou are splitting time across several active projects:\n");
            for project in projects {
                user.push_str(&format!(
                    "- {} (weeks {}..{}): {}\n",
                    project.project_name,
                    project.start_week,
                    project.end_week(),
                    project.project_summary
                ));
            }
        }
    }

    if !ctx.recent_emails.is_empty() {
        user.push_str("\nRecent emails you can reply to by id:\n");
        for email in ctx.recent_emails {
            user.push_str(&format!(
                "- [{}] from {} — {}\n",
                email.email_id, email.from, email.subject
            ));
        }
    }

    user.push_str(&format!(
        "\nAfter the focus bullets, add a '{}' section using ONLY these line shapes:\n\
         Email at HH:MM to ADDRESS: Subject | Body\n\
         Reply at HH:MM to [email-id]: Subject | Body\n\
         Chat at HH:MM to HANDLE: Message\n\
         Times must be later than the current minute of the day.",
        locale.scheduled_communications()
    ));

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn hourly_summary_messages(ctx: &HourlySummaryContext<'_>, locale: Locale) -> Vec<ChatMessage> {
    let system = format!(
        "You are {} summarising one hour of your own work. {}",
        ctx.worker.name,
        language_line(locale)
    );
    let user = format!(
        "Hour {} plans:\n{}\n\nSummarise what was accomplished in at most three bullets.",
        ctx.hour_index + 1,
        ctx.hourly_plans,
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn daily_report_messages(ctx: &DailyReportContext<'_>, locale: Locale) -> Vec<ChatMessage> {
    let system = format!(
        "{}\n\nYou are writing your end-of-day report. {}",
        ctx.worker.persona_markdown,
        language_line(locale)
    );
    let user = format!(
        "Project plan:\n{}\n\nDay {} plan:\n{}\n\nHourly log:\n{}\n\nSchedule outline:\n{}\n\n\
         Report highlights, risks, and carry-over work.",
        ctx.project_plan,
        ctx.day_index + 1,
        ctx.daily_plan,
        ctx.hourly_log,
        ctx.minute_schedule,
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn simulation_report_messages(
    ctx: &SimulationReportContext<'_>,
    locale: Locale,
) -> Vec<ChatMessage> {
    let team = ctx
        .team
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let system = format!(
        "You are the simulation manager writing the run retrospective. {}",
        language_line(locale)
    );
    let user = format!(
        "Project plan:\n{}\n\nTeam: {}\nTotal ticks: {}\n\nDaily reports:\n{}\n\n\
         Summarise outcomes, collaboration quality, and open risks.",
        ctx.project_plan, team, ctx.total_ticks, ctx.daily_reports,
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
