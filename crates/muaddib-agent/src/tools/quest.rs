//! `quest_start` / `subquest_start` / `quest_snooze` — long-running goal
//! tracking, recorded to the chronicle and woken up via the job scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveTime, Timelike};
use muaddib_memory::MemoryManager;
use muaddib_scheduler::{Schedule, SchedulerHandle};

use super::{Tool, ToolResult};

fn validate_id_and_goal(id: &str, goal: &str, success_criteria: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("quest id must not be empty".to_string());
    }
    if goal.trim().is_empty() {
        return Err("goal must not be empty".to_string());
    }
    if success_criteria.trim().is_empty() {
        return Err("success_criteria must not be empty".to_string());
    }
    Ok(())
}

fn parse_hh_mm(time: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(time, "%H:%M").map_err(|_| format!("'{time}' is not a valid HH:MM time"))
}

pub struct QuestStartTool {
    memory: Arc<MemoryManager>,
    arc: String,
}

impl QuestStartTool {
    pub fn new(memory: Arc<MemoryManager>, arc: impl Into<String>) -> Self {
        Self { memory, arc: arc.into() }
    }
}

#[async_trait]
impl Tool for QuestStartTool {
    fn name(&self) -> &str {
        "quest_start"
    }

    fn description(&self) -> &str {
        "Begin tracking a long-running goal: an id, a goal statement, and the criteria that mark it done."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "goal": { "type": "string" },
                "success_criteria": { "type": "string" }
            },
            "required": ["id", "goal", "success_criteria"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let id = input.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let goal = input.get("goal").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let success_criteria =
            input.get("success_criteria").and_then(|v| v.as_str()).unwrap_or("").to_string();
        if let Err(e) = validate_id_and_goal(&id, &goal, &success_criteria) {
            return ToolResult::error(e);
        }
        if id.contains('.') {
            return ToolResult::error("quest_start ids must not contain '.'; use subquest_start for sub-goals");
        }

        let entry = format!("Quest '{id}' started. Goal: {goal}. Success criteria: {success_criteria}.");
        match self.memory.append_paragraph(&self.arc, &entry) {
            Ok(_) => ToolResult::success(format!("Quest '{id}' is now active.")),
            Err(e) => ToolResult::error(format!("quest_start failed to record: {e}")),
        }
    }
}

pub struct SubquestStartTool {
    memory: Arc<MemoryManager>,
    arc: String,
}

impl SubquestStartTool {
    pub fn new(memory: Arc<MemoryManager>, arc: impl Into<String>) -> Self {
        Self { memory, arc: arc.into() }
    }
}

#[async_trait]
impl Tool for SubquestStartTool {
    fn name(&self) -> &str {
        "subquest_start"
    }

    fn description(&self) -> &str {
        "Begin tracking a sub-goal of the active quest, identified as '<quest_id>.<subquest_id>'."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "description": "'<quest_id>.<subquest_id>'" },
                "goal": { "type": "string" },
                "success_criteria": { "type": "string" }
            },
            "required": ["id", "goal", "success_criteria"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let id = input.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let goal = input.get("goal").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let success_criteria =
            input.get("success_criteria").and_then(|v| v.as_str()).unwrap_or("").to_string();
        if let Err(e) = validate_id_and_goal(&id, &goal, &success_criteria) {
            return ToolResult::error(e);
        }
        if !id.contains('.') {
            return ToolResult::error("subquest_start ids must be '<quest_id>.<subquest_id>'");
        }

        let entry = format!("Subquest '{id}' started. Goal: {goal}. Success criteria: {success_criteria}.");
        match self.memory.append_paragraph(&self.arc, &entry) {
            Ok(_) => ToolResult::success(format!("Subquest '{id}' is now active.")),
            Err(e) => ToolResult::error(format!("subquest_start failed to record: {e}")),
        }
    }
}

pub struct QuestSnoozeTool {
    scheduler: Arc<SchedulerHandle>,
    arc: String,
}

impl QuestSnoozeTool {
    pub fn new(scheduler: Arc<SchedulerHandle>, arc: impl Into<String>) -> Self {
        Self { scheduler, arc: arc.into() }
    }
}

#[async_trait]
impl Tool for QuestSnoozeTool {
    fn name(&self) -> &str {
        "quest_snooze"
    }

    fn description(&self) -> &str {
        "Schedule a wake-up at a time of day (HH:MM, UTC) to resume work on the active quest."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "wake_at": { "type": "string", "description": "Time of day in HH:MM (UTC)" },
                "reason": { "type": "string", "description": "Why the quest is pausing" }
            },
            "required": ["wake_at"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let wake_at = match input.get("wake_at").and_then(|v| v.as_str()) {
            Some(t) => t.to_string(),
            None => return ToolResult::error("quest_snooze requires 'wake_at'"),
        };
        let time = match parse_hh_mm(&wake_at) {
            Ok(t) => t,
            Err(e) => return ToolResult::error(e),
        };
        let reason = input.get("reason").and_then(|v| v.as_str()).unwrap_or("quest snooze");

        let schedule = Schedule::Daily { hour: time.hour() as u8, minute: time.minute() as u8 };
        let job_name = format!("quest-snooze:{}", self.arc);
        let action = format!("resume_quest:{}:{}", self.arc, reason);

        match self.scheduler.add_job(&job_name, schedule, &action) {
            Ok(job) => ToolResult::success(format!("Snoozed; will resume around {wake_at} UTC (job {}).", job.id)),
            Err(e) => ToolResult::error(format!("quest_snooze failed to schedule: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Arc<MemoryManager> {
        let conn = rusqlite::Connection::open_in_memory().expect("in-memory db");
        muaddib_memory::db::init_db(&conn).expect("schema init");
        Arc::new(MemoryManager::new(conn))
    }

    fn scheduler() -> Arc<SchedulerHandle> {
        let conn = rusqlite::Connection::open_in_memory().expect("in-memory db");
        Arc::new(SchedulerHandle::new(conn).expect("scheduler init"))
    }

    #[tokio::test]
    async fn quest_start_rejects_dotted_id() {
        let tool = QuestStartTool::new(memory(), "test-arc");
        let result = tool
            .execute(serde_json::json!({ "id": "a.b", "goal": "g", "success_criteria": "c" }))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn subquest_start_requires_dotted_id() {
        let tool = SubquestStartTool::new(memory(), "test-arc");
        let result = tool
            .execute(serde_json::json!({ "id": "plain", "goal": "g", "success_criteria": "c" }))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn quest_start_succeeds_with_valid_fields() {
        let tool = QuestStartTool::new(memory(), "test-arc");
        let result = tool
            .execute(serde_json::json!({ "id": "ship-v2", "goal": "g", "success_criteria": "c" }))
            .await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn quest_snooze_rejects_bad_time_format() {
        let tool = QuestSnoozeTool::new(scheduler(), "test-arc");
        let result = tool.execute(serde_json::json!({ "wake_at": "not-a-time" })).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn quest_snooze_schedules_a_daily_job() {
        let tool = QuestSnoozeTool::new(scheduler(), "test-arc");
        let result = tool.execute(serde_json::json!({ "wake_at": "09:30" })).await;
        assert!(!result.is_error);
    }
}
