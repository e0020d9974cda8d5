use std::collections::HashMap;

use rand::Rng;
use tracing::{debug, info, warn};

use officesim_comms::{CommChannel, DispatchLookups};
use officesim_core::locale::Locale;
use officesim_core::types::{
    AdvanceResult, InboundMessage, MessageChannel, MessageKind, Person, STATUS_SICK_LEAVE,
};
use officesim_core::{Result, SimError};
use officesim_events::EventHooks;
use officesim_gateways::{OutgoingDm, OutgoingEmail};
use officesim_planning::{summarize_plan, PlanningTask};
use officesim_store::PlanType;

use crate::engine::{storage, SimulationEngine};

/// Per-person context carried from phase 1 into phase 3.
struct PhaseContext {
    daily_plan_text: String,
    project_name: String,
    is_sick: bool,
}

impl SimulationEngine {
    /// Advance the simulation by `ticks` under the advance mutex. Each tick
    /// runs the full pipeline: events, inbox drains and acks, planning,
    /// scheduled-then-fallback dispatch, and boundary aggregation.
    pub async fn advance(&self, ticks: i64, reason: &str) -> Result<AdvanceResult> {
        let _guard = self.ticks.lock_advance().await;

        let mut status = self.state.simulation_state().map_err(storage)?;
        if !status.is_running {
            return Err(SimError::NotRunning);
        }
        if ticks <= 0 {
            return Err(SimError::InputInvalid("ticks must be positive".into()));
        }

        let project_plan = self
            .projects
            .get_project_plan(None)
            .map_err(storage)?
            .ok_or_else(|| {
                SimError::InputInvalid(
                    "project plan is not initialised; start the simulation with project details"
                        .into(),
                )
            })?;

        let people = self.active_people()?;
        if people.is_empty() {
            return Err(SimError::InputInvalid(
                "cannot advance simulation without any active personas".into(),
            ));
        }
        self.runtime.sync_runtimes(&people).map_err(storage)?;
        let people_by_id: HashMap<i64, Person> =
            people.iter().map(|p| (p.id, p.clone())).collect();

        let h = self.ticks.hours_per_day();
        let current_week = self.ticks.current_week(status.current_tick);
        let model_hint = self.model_hint.lock().unwrap().clone();
        let model_hint = model_hint.as_deref();

        let mut emails_sent: u64 = 0;
        let mut chats_sent: u64 = 0;

        for _ in 0..ticks {
            status.current_tick += 1;
            let tick = status.current_tick;
            self.hub.reset_tick_sends();
            self.state.set_tick(tick, reason).map_err(storage)?;
            self.state.expire_status_overrides(tick).map_err(storage)?;

            let hooks = EventHooks {
                runtime: &self.runtime,
                state: &self.state,
                email: self.email.as_ref(),
                exchange: &self.exchange,
                manager_email: &self.config.simulation.manager_email,
            };
            let (event_adjustments, _) = self
                .events
                .process_events_for_tick(
                    tick,
                    &people,
                    h,
                    &self.state.status_overrides(),
                    &hooks,
                )
                .await
                .map_err(storage)?;

            let day_index = (tick - 1) / h;
            let tick_of_day = (tick - 1) % h;

            // Keep only this minute's planning-attempt counters.
            {
                let mut attempts = self.plan_attempts.lock().unwrap();
                attempts.retain(|(_, day, tod), _| *day == day_index && *tod == tick_of_day);
            }

            let current_week_fn = || self.current_week_now();
            let active_project_ids_fn = |person_id: i64, week: i64| -> Vec<i64> {
                self.projects
                    .active_projects_for_person(person_id, week)
                    .map(|plans| plans.iter().map(|p| p.id).collect())
                    .unwrap_or_default()
            };
            let project_room_fn = |project_id: i64| -> Option<String> {
                self.projects
                    .active_project_chat_room(project_id)
                    .ok()
                    .flatten()
            };
            let lookups = DispatchLookups {
                current_week: &current_week_fn,
                active_project_ids: &active_project_ids_fn,
                project_room: &project_room_fn,
            };

            // PHASE 1: drain inboxes, send acks, collect planning tasks.
            let mut planning_tasks: Vec<PlanningTask> = Vec::new();
            let mut contexts: HashMap<i64, PhaseContext> = HashMap::new();

            for person in &people {
                let mut incoming = self.runtime.drain(person).map_err(storage)?;
                let working = self.ticks.is_within_work_hours(person, tick);
                let mut adjustments: Vec<String> =
                    event_adjustments.get(&person.id).cloned().unwrap_or_default();
                let is_sick = self
                    .state
                    .status_overrides()
                    .get(&person.id)
                    .map(|(status, _)| status == STATUS_SICK_LEAVE)
                    .unwrap_or(false);
                if is_sick {
                    // Sick workers neither read mail nor plan around it; the
                    // persisted rows wait for their return.
                    self.runtime.requeue(person.id, std::mem::take(&mut incoming));
                    adjustments.push(self.locale.sick_leave_adjustment().to_string());
                }

                if !working {
                    if !incoming.is_empty() {
                        self.runtime.requeue(person.id, incoming);
                    }
                    for note in &adjustments {
                        let reminder = InboundMessage {
                            message_id: None,
                            sender_id: 0,
                            sender_name: "Simulation Manager".into(),
                            subject: self.locale.pending_adjustment().into(),
                            summary: note.clone(),
                            action_item: Some(note.clone()),
                            message_type: MessageKind::Event,
                            channel: MessageChannel::System,
                            tick,
                        };
                        self.runtime.queue_message(person, reminder).map_err(storage)?;
                    }
                    debug!(person = %person.name, tick, "skipping planning (off hours)");
                    continue;
                }

                // Scheduled comms due now are dispatched before planning; a
                // person who just sent skips fallback and planning this tick.
                let (se, sc) = self
                    .hub
                    .dispatch_scheduled(person, tick, &people_by_id, &lookups)
                    .await;
                if se + sc > 0 {
                    emails_sent += se;
                    chats_sent += sc;
                    self.runtime.requeue(person.id, incoming);
                    continue;
                }

                let should_plan = !incoming.is_empty()
                    || !adjustments.is_empty()
                    || reason != "auto"
                    || tick_of_day == 0;
                if !should_plan {
                    continue;
                }

                // Per-minute limiter; recorded before planning so a failing
                // planner cannot re-enter in a storm.
                {
                    let mut attempts = self.plan_attempts.lock().unwrap();
                    let count = attempts.entry((person.id, day_index, tick_of_day)).or_insert(0);
                    if *count >= self.config.simulation.max_hourly_plans_per_minute {
                        warn!(
                            person = %person.name,
                            tick,
                            cap = self.config.simulation.max_hourly_plans_per_minute,
                            "skipping hourly planning (minute cap reached)"
                        );
                        self.runtime.requeue(person.id, incoming);
                        continue;
                    }
                    *count += 1;
                }

                let ids: Vec<i64> = incoming.iter().filter_map(|m| m.message_id).collect();
                self.runtime.remove_messages(&ids).map_err(storage)?;

                chats_sent += self
                    .acknowledge_incoming(person, &incoming, &mut adjustments, tick, &people_by_id)
                    .await?;

                let mut active_projects = self
                    .projects
                    .active_projects_for_person(person.id, current_week)
                    .map_err(storage)?;
                if active_projects.is_empty() {
                    active_projects = vec![project_plan.clone()];
                }
                let primary = active_projects[0].clone();

                let daily_plan_text = self
                    .planning
                    .ensure_daily_plan(person, day_index, &primary, &people, model_hint)
                    .await?;

                contexts.insert(
                    person.id,
                    PhaseContext {
                        daily_plan_text: daily_plan_text.clone(),
                        project_name: primary.project_name.clone(),
                        is_sick,
                    },
                );
                let multi = (active_projects.len() > 1).then_some(active_projects);
                planning_tasks.push(PlanningTask {
                    person: person.clone(),
                    project: primary,
                    daily_plan_text,
                    tick,
                    reason: reason.to_string(),
                    adjustments,
                    all_active_projects: multi,
                });
            }

            // PHASE 2: planning, bounded-parallel, input order preserved.
            let plan_results = self
                .planning
                .generate_hourly_plans_parallel(planning_tasks, &people, model_hint)
                .await;

            // PHASE 3: schedule parsed comms, dispatch, fall back.
            let mut plans_batch = Vec::with_capacity(plan_results.len());
            for (person, hourly_result) in &plan_results {
                let Some(ctx) = contexts.get(&person.id) else {
                    continue;
                };
                let daily_summary = summarize_plan(&ctx.daily_plan_text, 3);
                let hourly_summary = summarize_plan(&hourly_result.content, 4);
                plans_batch.push((
                    person.id,
                    tick,
                    PlanType::Hourly,
                    hourly_result.clone(),
                    None,
                ));

                self.hub
                    .schedule_from_hourly_plan(person, &hourly_result.content, tick);

                if ctx.is_sick {
                    continue;
                }

                let (se, sc) = self
                    .hub
                    .dispatch_scheduled(person, tick, &people_by_id, &lookups)
                    .await;
                emails_sent += se;
                chats_sent += sc;
                if se + sc > 0 {
                    continue;
                }

                let recipients = self.select_collaborators(person, &people);
                if recipients.is_empty() {
                    let (fe, fc) = self
                        .manager_fallback(person, &ctx.project_name, &daily_summary, &hourly_summary, tick)
                        .await?;
                    emails_sent += fe;
                    chats_sent += fc;
                    continue;
                }

                let (fe, fc) = self
                    .collaborator_fallback(
                        person,
                        &recipients,
                        &people,
                        &hourly_summary,
                        &daily_summary,
                        tick,
                    )
                    .await?;
                emails_sent += fe;
                chats_sent += fc;
            }

            self.plans.batch_put_worker_plans(&plans_batch).map_err(storage)?;

            // Hour boundary: summarise the completed 60-tick hour.
            if tick % 60 == 0 {
                self.planning
                    .generate_hourly_summaries(&people, tick / 60 - 1, model_hint)
                    .await;
            }
            // Day boundary: end-of-day reports.
            if tick % h == 0 {
                self.planning
                    .generate_daily_reports(&people, tick / h - 1, &project_plan, model_hint)
                    .await;
            }
        }

        info!(
            ticks,
            current_tick = status.current_tick,
            emails_sent,
            chats_sent,
            "advance complete"
        );
        Ok(AdvanceResult {
            ticks_advanced: ticks,
            current_tick: status.current_tick,
            emails_sent,
            chat_messages_sent: chats_sent,
            sim_time: self.ticks.format_sim_time(status.current_tick),
        })
    }

    /// Acknowledge drained non-ack messages back to their senders via DM
    /// and fold their action items into the adjustments list. Returns the
    /// number of chats sent.
    async fn acknowledge_incoming(
        &self,
        person: &Person,
        incoming: &[InboundMessage],
        adjustments: &mut Vec<String>,
        tick: i64,
        people_by_id: &HashMap<i64, Person>,
    ) -> Result<u64> {
        let mut chats = 0u64;
        for message in incoming {
            if message.message_type == MessageKind::Ack {
                adjustments.push(self.locale.ack_from(&message.sender_name, &message.summary));
                continue;
            }
            if let Some(action_item) = &message.action_item {
                adjustments.push(
                    self.locale
                        .handle_request_from(&message.sender_name, action_item),
                );
            }
            let Some(sender) = people_by_id.get(&message.sender_id) else {
                continue;
            };

            let phrase = message
                .action_item
                .clone()
                .filter(|s| !s.is_empty())
                .or_else(|| Some(message.summary.clone()).filter(|s| !s.is_empty()))
                .unwrap_or_else(|| self.locale.your_latest_update().to_string());
            let phrase = phrase.trim_end_matches('.').to_string();
            let patterns = self.locale.ack_patterns(sender.first_name(), &phrase);
            let index = self.rng.lock().unwrap().gen_range(0..patterns.len());
            let ack_body = patterns[index].clone();

            if self.hub.can_send(
                tick,
                CommChannel::Chat,
                &person.chat_handle,
                std::slice::from_ref(&sender.chat_handle),
                None,
                &ack_body,
            ) {
                let sent_at_iso = self
                    .ticks
                    .sim_datetime_for_tick(tick)
                    .map(|dt| dt.to_rfc3339());
                match self
                    .chat
                    .send_dm(OutgoingDm {
                        sender: person.chat_handle.clone(),
                        recipient: sender.chat_handle.clone(),
                        body: ack_body.clone(),
                        sent_at_iso,
                        persona_id: Some(person.id),
                    })
                    .await
                {
                    Ok(()) => chats += 1,
                    Err(e) => warn!(person = %person.name, error = %e, "ack DM failed; dropped"),
                }
            }
            self.exchange
                .record(tick, Some(person.id), Some(sender.id), "chat", None, Some(&ack_body))
                .map_err(storage)?;

            let ack = InboundMessage {
                message_id: None,
                sender_id: person.id,
                sender_name: person.name.clone(),
                subject: self.locale.acknowledgement_from(&person.name),
                summary: ack_body,
                action_item: None,
                message_type: MessageKind::Ack,
                channel: MessageChannel::Chat,
                tick,
            };
            self.runtime.queue_message(sender, ack).map_err(storage)?;
        }
        Ok(chats)
    }

    /// Fallback traffic for a worker with no collaborators: the simulation
    /// manager mails and pings them directly.
    async fn manager_fallback(
        &self,
        person: &Person,
        project_name: &str,
        daily_summary: &str,
        hourly_summary: &str,
        tick: i64,
    ) -> Result<(u64, u64)> {
        let mut emails = 0u64;
        let mut chats = 0u64;
        let manager_email = &self.config.simulation.manager_email;
        let manager_handle = &self.config.simulation.manager_handle;
        let sent_at_iso = self
            .ticks
            .sim_datetime_for_tick(tick)
            .map(|dt| dt.to_rfc3339());

        let subject = self.locale.update_for(&person.name);
        let body = format!(
            "Project: {project_name}\nDaily focus:\n{daily_summary}\n\nHourly plan:\n{hourly_summary}\n\nKeep the runway clear for surprises."
        );
        if self.hub.can_send(
            tick,
            CommChannel::Email,
            manager_email,
            std::slice::from_ref(&person.email_address),
            Some(&subject),
            &body,
        ) {
            match self
                .email
                .send_email(OutgoingEmail {
                    sender: manager_email.clone(),
                    to: vec![person.email_address.clone()],
                    subject: subject.clone(),
                    body: body.clone(),
                    sent_at_iso: sent_at_iso.clone(),
                    persona_id: None,
                    ..Default::default()
                })
                .await
            {
                Ok(_) => emails += 1,
                Err(e) => warn!(error = %e, "manager fallback email failed; dropped"),
            }
        }
        self.exchange
            .record(tick, None, Some(person.id), "email", Some(&subject), Some(&body))
            .map_err(storage)?;

        let chat_body = format!(
            "Quick update: {}\nLet me know if you need support.",
            hourly_summary.replace('\n', " / ")
        );
        if self.hub.can_send(
            tick,
            CommChannel::Chat,
            manager_handle,
            std::slice::from_ref(&person.chat_handle),
            None,
            &chat_body,
        ) {
            match self
                .chat
                .send_dm(OutgoingDm {
                    sender: manager_handle.clone(),
                    recipient: person.chat_handle.clone(),
                    body: chat_body.clone(),
                    sent_at_iso,
                    persona_id: None,
                })
                .await
            {
                Ok(()) => chats += 1,
                Err(e) => warn!(error = %e, "manager fallback DM failed; dropped"),
            }
        }
        self.exchange
            .record(tick, None, Some(person.id), "chat", None, Some(&chat_body))
            .map_err(storage)?;

        Ok((emails, chats))
    }

    /// Fallback traffic toward selected collaborators: one email each (the
    /// first also gets a DM), plus an inbox update so they react next tick.
    async fn collaborator_fallback(
        &self,
        person: &Person,
        recipients: &[Person],
        people: &[Person],
        hourly_summary: &str,
        daily_summary: &str,
        tick: i64,
    ) -> Result<(u64, u64)> {
        let mut emails = 0u64;
        let mut chats = 0u64;
        let action_item = derive_action_item(hourly_summary, daily_summary);
        let sent_at_iso = self
            .ticks
            .sim_datetime_for_tick(tick)
            .map(|dt| dt.to_rfc3339());

        for (index, recipient) in recipients.iter().enumerate() {
            let subject = self.locale.update_from_to(&person.name, &recipient.name);
            let focus = if !hourly_summary.is_empty() {
                hourly_summary
            } else if !daily_summary.is_empty() {
                daily_summary
            } else if self.locale == Locale::Ko {
                "주요 작업에 집중하고 있습니다."
            } else {
                "Heads down on deliverables."
            };
            let body = match self.locale {
                Locale::Ko => format!(
                    "{}님 안녕하세요,\n\n현재 집중 작업:\n{}\n\n요청: {}\n필요하시면 언제든 말씀해 주세요.",
                    recipient.first_name(),
                    focus,
                    action_item,
                ),
                Locale::En => format!(
                    "Hey {},\n\nCurrent focus:\n{}\n\nRequest: {}\nPing me if you need anything shifted.",
                    recipient.first_name(),
                    focus,
                    action_item,
                ),
            };
            let cc = fallback_cc(person, recipient, people);

            if self.hub.can_send(
                tick,
                CommChannel::Email,
                &person.email_address,
                std::slice::from_ref(&recipient.email_address),
                Some(&subject),
                &body,
            ) {
                match self
                    .email
                    .send_email(OutgoingEmail {
                        sender: person.email_address.clone(),
                        to: vec![recipient.email_address.clone()],
                        cc,
                        subject: subject.clone(),
                        body: body.clone(),
                        sent_at_iso: sent_at_iso.clone(),
                        persona_id: Some(person.id),
                        ..Default::default()
                    })
                    .await
                {
                    Ok(_) => emails += 1,
                    Err(e) => warn!(error = %e, "fallback email failed; dropped"),
                }
            }
            self.exchange
                .record(
                    tick,
                    Some(person.id),
                    Some(recipient.id),
                    "email",
                    Some(&subject),
                    Some(&body),
                )
                .map_err(storage)?;

            // Only the first collaborator gets a DM; emails alone keep the
            // rest in the loop without doubling chat volume.
            if index == 0 {
                let chat_body = match self.locale {
                    Locale::Ko => format!("간단 업데이트: {action_item}"),
                    Locale::En => format!("Quick update: {action_item}"),
                };
                if self.hub.can_send(
                    tick,
                    CommChannel::Chat,
                    &person.chat_handle,
                    std::slice::from_ref(&recipient.chat_handle),
                    None,
                    &chat_body,
                ) {
                    match self
                        .chat
                        .send_dm(OutgoingDm {
                            sender: person.chat_handle.clone(),
                            recipient: recipient.chat_handle.clone(),
                            body: chat_body.clone(),
                            sent_at_iso: sent_at_iso.clone(),
                            persona_id: Some(person.id),
                        })
                        .await
                    {
                        Ok(()) => chats += 1,
                        Err(e) => warn!(error = %e, "fallback DM failed; dropped"),
                    }
                }
                self.exchange
                    .record(tick, Some(person.id), Some(recipient.id), "chat", None, Some(&chat_body))
                    .map_err(storage)?;
            }

            let update = InboundMessage {
                message_id: None,
                sender_id: person.id,
                sender_name: person.name.clone(),
                subject,
                summary: action_item.clone(),
                action_item: Some(action_item.clone()),
                message_type: MessageKind::Update,
                channel: MessageChannel::EmailAndChat,
                tick,
            };
            self.runtime.queue_message(recipient, update).map_err(storage)?;
        }
        Ok((emails, chats))
    }
}

/// First meaningful line of the hourly (or daily) summary becomes the
/// request line of fallback traffic.
fn derive_action_item(hourly_summary: &str, daily_summary: &str) -> String {
    for source in [hourly_summary, daily_summary] {
        for line in source.lines() {
            let cleaned = line.trim().trim_start_matches(['-', '•']).trim();
            if cleaned.is_empty()
                || cleaned.starts_with("Tick:")
                || cleaned.starts_with("Worker:")
                || cleaned.starts_with("Reason:")
                || cleaned.starts_with("Outline:")
            {
                continue;
            }
            return cleaned.to_string();
        }
    }
    "Keep momentum on the current deliverables".to_string()
}

/// CC suggestion for fallback emails: department head plus one role-affine
/// peer, excluding the sender and primary recipient.
fn fallback_cc(person: &Person, recipient: &Person, people: &[Person]) -> Vec<String> {
    let mut cc: Vec<String> = Vec::new();
    if let Some(head) = people.iter().find(|p| p.is_department_head) {
        if head.id != person.id && head.id != recipient.id {
            cc.push(head.email_address.clone());
        }
    }

    let role = person.role.to_lowercase();
    let want_peer = if role.contains("devops") || role.contains("site reliability") {
        Some("dev")
    } else if role.contains("developer") || role.contains("engineer") || role.contains("dev") {
        Some("designer")
    } else if role.contains("design") {
        Some("dev")
    } else if role.contains("product") || role.contains("pm") || role.contains("manager") {
        Some("dev")
    } else {
        None
    };
    if let Some(want) = want_peer {
        for p in people {
            if p.id == person.id || p.id == recipient.id {
                continue;
            }
            if p.role.to_lowercase().contains(want)
                && !cc.iter().any(|c| c.eq_ignore_ascii_case(&p.email_address))
            {
                cc.push(p.email_address.clone());
                break;
            }
        }
    }
    cc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_item_skips_meta_lines() {
        let hourly = "Worker: Alice\n- review PR\n- ship";
        assert_eq!(derive_action_item(hourly, ""), "review PR");
        assert_eq!(
            derive_action_item("", ""),
            "Keep momentum on the current deliverables"
        );
    }
}
