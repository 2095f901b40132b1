//! Calendar tools backed by `calendar.json`
//!
//! Events are kept sorted by date then time. Dates are `YYYY-MM-DD` and times
//! `HH:MM`; malformed input is answered with an error sentence for the model
//! rather than failing the tool call.

use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::{ToolRegistry, from_fn};
use super::schema::{ParamKind, ToolSchema};
use super::store::JsonFile;
use super::todo::str_arg;
use crate::Result;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// A stored calendar entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub title: String,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct Calendar {
    file: JsonFile,
}

impl Calendar {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            file: JsonFile::new(dir.join("calendar.json")),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the calendar cannot be persisted
    pub async fn add(&self, title: &str, date: &str, time: &str, description: &str) -> Result<String> {
        if NaiveDate::parse_from_str(date, DATE_FORMAT).is_err()
            || NaiveTime::parse_from_str(time, TIME_FORMAT).is_err()
        {
            return Ok("Error: Date must be YYYY-MM-DD and time must be HH:MM.".to_string());
        }

        let event = CalendarEvent {
            title: title.to_string(),
            date: date.to_string(),
            time: time.to_string(),
            description: description.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };

        self.file
            .update(|events: &mut Vec<CalendarEvent>| {
                events.push(event);
                events.sort_by(|a, b| (&a.date, &a.time).cmp(&(&b.date, &b.time)));
                ((), true)
            })
            .await?;

        Ok(format!("Event '{title}' added for {date} at {time}."))
    }

    /// List every event, or only those on `date`
    ///
    /// # Errors
    ///
    /// Returns an error if the calendar file cannot be read
    pub async fn list(&self, date: Option<&str>) -> Result<String> {
        let events: Vec<CalendarEvent> = self.file.read().await?;
        if events.is_empty() {
            return Ok("Calendar is empty.".to_string());
        }

        let header = date.map_or_else(|| "Upcoming Events:".to_string(), |d| format!("Events for {d}:"));
        let lines: Vec<String> = events
            .iter()
            .filter(|e| date.is_none_or(|d| e.date == d))
            .map(|e| format!("- [{} {}] {}: {}", e.date, e.time, e.title, e.description))
            .collect();

        if lines.is_empty() {
            return Ok("No events found.".to_string());
        }
        Ok(std::iter::once(header).chain(lines).collect::<Vec<_>>().join("\n"))
    }

    /// Delete every event whose title matches, ignoring case
    ///
    /// # Errors
    ///
    /// Returns an error if the calendar cannot be persisted
    pub async fn delete(&self, title: &str) -> Result<String> {
        let wanted = title.to_lowercase();
        let removed = self
            .file
            .update(|events: &mut Vec<CalendarEvent>| {
                let before = events.len();
                events.retain(|e| e.title.to_lowercase() != wanted);
                let removed = events.len() < before;
                (removed, removed)
            })
            .await?;

        Ok(if removed {
            format!("Event '{title}' deleted.")
        } else {
            format!("Event '{title}' not found.")
        })
    }

    /// Register `add_calendar_event`, `list_calendar_events` and
    /// `delete_calendar_event`
    ///
    /// # Errors
    ///
    /// Returns an error if any of the names is already registered
    pub fn register(self: Arc<Self>, registry: &mut ToolRegistry) -> Result<()> {
        let calendar = Arc::clone(&self);
        registry.register(
            "add_calendar_event",
            from_fn(move |args: Value| {
                let calendar = Arc::clone(&calendar);
                async move {
                    calendar
                        .add(
                            str_arg(&args, "title"),
                            str_arg(&args, "date"),
                            str_arg(&args, "time"),
                            str_arg(&args, "description"),
                        )
                        .await
                }
            }),
            ToolSchema::new("Add an event to the calendar")
                .param("title", ParamKind::String, "Title of the event")
                .param("date", ParamKind::String, "Date in YYYY-MM-DD format")
                .param("time", ParamKind::String, "Time in HH:MM format")
                .optional("description", ParamKind::String, "Optional details"),
        )?;

        let calendar = Arc::clone(&self);
        registry.register(
            "list_calendar_events",
            from_fn(move |args: Value| {
                let calendar = Arc::clone(&calendar);
                async move {
                    let date = args.get("date").and_then(Value::as_str);
                    calendar.list(date).await
                }
            }),
            ToolSchema::new("List calendar events, optionally for a single day").optional(
                "date",
                ParamKind::String,
                "Date in YYYY-MM-DD format",
            ),
        )?;

        let calendar = self;
        registry.register(
            "delete_calendar_event",
            from_fn(move |args: Value| {
                let calendar = Arc::clone(&calendar);
                async move { calendar.delete(str_arg(&args, "title")).await }
            }),
            ToolSchema::new("Delete calendar events by title").param(
                "title",
                ParamKind::String,
                "Title of the event to delete",
            ),
        )
    }
}
