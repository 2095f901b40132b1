//! To-do list tools backed by `todo.json`

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use super::registry::{ToolRegistry, from_fn};
use super::schema::{ParamKind, ToolSchema};
use super::store::JsonFile;
use crate::Result;

/// Flat list of task strings
#[derive(Debug)]
pub struct TodoList {
    file: JsonFile,
}

impl TodoList {
    /// Open (lazily) the list stored in `dir/todo.json`
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            file: JsonFile::new(dir.join("todo.json")),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the list cannot be persisted
    pub async fn add(&self, task: &str) -> Result<String> {
        self.file
            .update(|tasks: &mut Vec<String>| {
                tasks.push(task.to_string());
                ((), true)
            })
            .await?;
        Ok(format!("Task '{task}' added to the to-do list."))
    }

    /// Remove the first task matching `task` exactly
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be persisted
    pub async fn delete(&self, task: &str) -> Result<String> {
        let removed = self
            .file
            .update(|tasks: &mut Vec<String>| {
                tasks.iter().position(|t| t == task).map_or((false, false), |i| {
                    tasks.remove(i);
                    (true, true)
                })
            })
            .await?;

        Ok(if removed {
            format!("Task '{task}' removed from the to-do list.")
        } else {
            format!("Task '{task}' not found in the to-do list.")
        })
    }

    /// # Errors
    ///
    /// Returns an error if the list file cannot be read
    pub async fn render(&self) -> Result<String> {
        let tasks: Vec<String> = self.file.read().await?;
        if tasks.is_empty() {
            return Ok("Your to-do list is empty.".to_string());
        }

        let mut out = String::from("Your to-do list:");
        for (i, task) in tasks.iter().enumerate() {
            let _ = write!(out, "\n{}. {task}", i + 1);
        }
        Ok(out)
    }

    /// Register `add_todo_task`, `delete_todo_task` and `list_todo_tasks`
    ///
    /// # Errors
    ///
    /// Returns an error if any of the names is already registered
    pub fn register(self: Arc<Self>, registry: &mut ToolRegistry) -> Result<()> {
        let list = Arc::clone(&self);
        registry.register(
            "add_todo_task",
            from_fn(move |args: Value| {
                let list = Arc::clone(&list);
                async move { list.add(str_arg(&args, "task")).await }
            }),
            ToolSchema::new("Add a task to the to-do list").param(
                "task",
                ParamKind::String,
                "The task to add",
            ),
        )?;

        let list = Arc::clone(&self);
        registry.register(
            "delete_todo_task",
            from_fn(move |args: Value| {
                let list = Arc::clone(&list);
                async move { list.delete(str_arg(&args, "task")).await }
            }),
            ToolSchema::new("Remove a task from the to-do list").param(
                "task",
                ParamKind::String,
                "The exact task to remove",
            ),
        )?;

        let list = self;
        registry.register(
            "list_todo_tasks",
            from_fn(move |_| {
                let list = Arc::clone(&list);
                async move { list.render().await }
            }),
            ToolSchema::new("Read out the current to-do list"),
        )
    }
}

/// String argument already checked by the schema
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn add_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let list = TodoList::new(dir.path());

        assert_eq!(list.render().await.unwrap(), "Your to-do list is empty.");
        assert_eq!(
            list.add("buy milk").await.unwrap(),
            "Task 'buy milk' added to the to-do list."
        );
        list.add("call mom").await.unwrap();
        assert_eq!(
            list.render().await.unwrap(),
            "Your to-do list:\n1. buy milk\n2. call mom"
        );

        assert_eq!(
            list.delete("buy milk").await.unwrap(),
            "Task 'buy milk' removed from the to-do list."
        );
        assert_eq!(
            list.delete("buy milk").await.unwrap(),
            "Task 'buy milk' not found in the to-do list."
        );
        assert_eq!(list.render().await.unwrap(), "Your to-do list:\n1. call mom");
    }

    #[tokio::test]
    async fn tools_round_trip_through_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        Arc::new(TodoList::new(dir.path()))
            .register(&mut registry)
            .unwrap();

        registry
            .invoke("add_todo_task", &json!({ "task": "water plants" }))
            .await
            .unwrap();
        let listed = registry.invoke("list_todo_tasks", &Value::Null).await.unwrap();
        assert!(listed.contains("1. water plants"));

        let err = registry.invoke("add_todo_task", &json!({})).await.unwrap_err();
        assert!(err.to_string().contains("task"));
    }
}
