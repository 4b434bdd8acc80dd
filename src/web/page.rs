use minijinja::{context, Environment};
use serde::Serialize;

use crate::types::TaskSnapshot;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Name Lock</title>
  <style>
    body { font-family: Arial, sans-serif; background: #f5f5f5; margin: 0; padding: 20px; }
    .container { max-width: 800px; margin: auto; background: #fff; padding: 20px; border-radius: 10px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); }
    .task { border: 1px solid #ddd; padding: 10px; margin-top: 10px; border-radius: 8px; background: #fafafa; }
    .flash { padding: 10px; border-radius: 6px; margin-bottom: 12px; }
    .flash.success { background: #e6f4ea; color: #1e6b34; }
    .flash.error { background: #fdecea; color: #8a1c14; }
    .btn { background: #007bff; color: white; padding: 6px 12px; border: none; border-radius: 5px; cursor: pointer; }
    .btn-danger { background: #dc3545; }
    textarea, input[type=text], input[type=password] { width: 100%; box-sizing: border-box; }
  </style>
</head>
<body>
<div class="container">
  <h2>Name Lock</h2>
  {% if flash %}<div class="flash {{ flash.kind }}">{{ flash.message }}</div>{% endif %}
  <form method="post" action="/start">
    <label>Access Key</label><br>
    <input type="password" name="access_key" required><br><br>
    <label>AppState (JSON or cookie string)</label><br>
    <textarea name="app_state" rows="6" required></textarea><br><br>
    <label>Target ID</label><br>
    <input type="text" name="target_id" required><br><br>
    <label>Name to lock</label><br>
    <input type="text" name="target_name" required><br><br>
    <button class="btn" type="submit">Start</button>
  </form>

  <h3>Active Tasks</h3>
  {% for task in tasks %}
  <div class="task">
    <strong>ID:</strong> {{ task.id }}<br>
    <strong>Target:</strong> {{ task.target_id }}<br>
    <strong>Locked Name:</strong> {{ task.target_name }}<br>
    <strong>Status:</strong> {{ task.status }} ({{ task.successes }}/{{ task.rounds }} rounds confirmed)<br>
    {% if task.last_message %}<strong>Last:</strong> {{ task.last_message }}<br>{% endif %}
    <button class="btn" data-id="{{ task.id }}" onclick="viewLog(this.dataset.id)">View Log</button>
    <button class="btn btn-danger" data-id="{{ task.id }}" onclick="stopTask(this.dataset.id)">Stop</button>
  </div>
  {% else %}
  <p>No active tasks.</p>
  {% endfor %}
</div>
<script>
function stopTask(id) {
  fetch('/stop/' + encodeURIComponent(id), { method: 'POST' })
    .then(r => r.json())
    .then(data => { alert(data.message); location.reload(); });
}
function viewLog(id) {
  window.open('/log/' + encodeURIComponent(id), '_blank');
}
</script>
</body>
</html>
"#;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }
}

/// Compiled page templates. `.html` names get minijinja's HTML autoescaping.
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("index.html", INDEX_HTML)?;
        Ok(Self { env })
    }

    pub fn index(&self, tasks: &[TaskSnapshot], flash: Option<&Flash>) -> Result<String, minijinja::Error> {
        self.env
            .get_template("index.html")?
            .render(context! { tasks => tasks, flash => flash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    fn snapshot(name: &str) -> TaskSnapshot {
        TaskSnapshot {
            id: "abc".into(),
            target_id: "42".into(),
            target_name: name.into(),
            status: TaskStatus::Running,
            created_at: chrono::Utc::now(),
            last_message: None,
            rounds: 3,
            successes: 2,
            log_file: "logs/log_abc.jsonl".into(),
            recent: vec![],
        }
    }

    #[test]
    fn renders_tasks_and_escapes_user_text() {
        let pages = Pages::new().unwrap();
        let html = pages
            .index(&[snapshot("<script>x</script>")], Some(&Flash::error("bad & wrong")))
            .unwrap();
        assert!(html.contains("running (2/3 rounds confirmed)"));
        assert!(html.contains("&lt;script&gt;x"));
        assert!(!html.contains("<script>x"));
        assert!(html.contains("bad &amp; wrong"));
        assert!(html.contains("flash error"));
    }

    #[test]
    fn renders_empty_state() {
        let html = Pages::new().unwrap().index(&[], None).unwrap();
        assert!(html.contains("No active tasks."));
        assert!(!html.contains("class=\"flash"));
    }
}
