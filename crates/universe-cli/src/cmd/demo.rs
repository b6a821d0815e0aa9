use crate::output::{envelope_line, print_json};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use universe_core::triggers::{TriggerKind, TriggerSystem};
use universe_core::{App, AppCatalog, EventKind, ResultEnvelope, Runtime};

#[derive(serde::Serialize)]
struct Step {
    app: String,
    action: String,
    envelope: ResultEnvelope,
}

impl Step {
    fn new(app: &App, action: &str, envelope: ResultEnvelope) -> Self {
        Self {
            app: app.name().to_string(),
            action: action.to_string(),
            envelope,
        }
    }
}

/// Walk the built-in apps through a short, realistic session: send and list
/// mail, create and update a task, book a calendar event, and deliver a
/// webhook.
pub fn run(root: &Path, seed: Option<u64>, chaos: Option<f64>, json: bool) -> anyhow::Result<()> {
    let catalog = AppCatalog::builtin();
    let config = super::with_overrides(super::load_config(root)?, seed, chaos);
    config.ensure_valid()?;

    let runtime = Runtime::from_config(&config);
    for app in catalog.apps() {
        runtime.attach(app);
    }

    let created = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen = Arc::clone(&created);
    runtime.store().subscribe("TaskPad", EventKind::Create, move |event| {
        if let Some(id) = event.data["id"].as_str() {
            seen.lock().map_err(|e| e.to_string())?.push(id.to_string());
        }
        Ok(())
    });

    let mailer = catalog.require("MailoMailer")?;
    let taskpad = catalog.require("TaskPad")?;
    let calendar = catalog.require("AutoBooker Calendar")?;

    let steps = super::block_on(async {
        let mut steps = Vec::new();
        let opening = [
            (
                mailer,
                "send_email",
                json!({
                    "to": "user@example.com",
                    "subject": "Hello from the universe",
                    "body": "This is a test email sent through MailoMailer."
                }),
            ),
            (mailer, "list_emails", json!({ "limit": 10 })),
            (
                taskpad,
                "create_task",
                json!({
                    "title": "Complete the universe runtime",
                    "description": "Finish all the core features",
                    "priority": "high"
                }),
            ),
        ];
        for (app, action, inputs) in opening {
            let envelope = runtime.execute_action(app, action, inputs).await;
            steps.push(Step::new(app, action, envelope));
        }

        let task_id = steps
            .last()
            .and_then(|s| s.envelope.result.as_ref())
            .and_then(|r| r["id"].as_str())
            .map(str::to_string);
        if let Some(id) = task_id {
            let envelope = runtime
                .execute_action(taskpad, "update_task", json!({ "id": id, "status": "in_progress" }))
                .await;
            steps.push(Step::new(taskpad, "update_task", envelope));
        }

        let booking = [
            (
                calendar,
                "create_event",
                json!({
                    "title": "Planning sync",
                    "start": "2026-03-02T10:00:00Z",
                    "end": "2026-03-02T10:30:00Z",
                    "attendees": ["user@example.com"]
                }),
            ),
            (calendar, "list_events", json!({})),
        ];
        for (app, action, inputs) in booking {
            let envelope = runtime.execute_action(app, action, inputs).await;
            steps.push(Step::new(app, action, envelope));
        }
        steps
    })?;

    let triggers = TriggerSystem::new();
    let webhook = triggers.register("AutoBooker Calendar", TriggerKind::Webhook, None, |fire| {
        Ok(json!({ "received": fire.payload.clone() }))
    });
    let delivery = triggers.fire_webhook(&webhook, json!({ "event": "booking.confirmed" }));

    let created_tasks = created.lock().map(|v| v.len()).unwrap_or(0);

    if json {
        return print_json(&json!({
            "steps": steps,
            "tasks_created": created_tasks,
            "webhook": {
                "id": webhook,
                "endpoint": triggers.webhook_endpoint(&webhook),
                "delivered": delivery,
            },
        }));
    }

    for step in &steps {
        println!(
            "{:<20} {:<14} {}",
            step.app,
            step.action,
            envelope_line(&step.envelope)
        );
    }
    println!();
    println!("TaskPad create events observed: {created_tasks}");
    if let Some(endpoint) = triggers.webhook_endpoint(&webhook) {
        let status = if delivery.is_some() { "delivered" } else { "not delivered" };
        println!("Webhook {endpoint}: {status}");
    }
    Ok(())
}
