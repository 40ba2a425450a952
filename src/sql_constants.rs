//! SQL query constants and fragments
//!
//! Column lists and base queries shared by the managers. Dynamic WHERE
//! clauses are still built inline with `QueryBuilder`.

// ============================================================================
// Task Queries
// ============================================================================

/// Columns: id, user_id, title, description, status, priority, ai_status,
///          ai_status_updated_at, due_date, created_at
pub const TASK_COLUMNS: &str = "id, user_id, title, description, status, priority, ai_status, ai_status_updated_at, due_date, created_at";

/// Base SELECT query for tasks. Add WHERE clauses as needed.
pub const SELECT_TASK_FULL: &str = const_format::formatcp!("SELECT {} FROM tasks", TASK_COLUMNS);

pub const SELECT_TASK_BY_ID: &str =
    const_format::formatcp!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);

pub const SELECT_TASK_BY_ID_FOR_OWNER: &str = const_format::formatcp!(
    "SELECT {} FROM tasks WHERE id = ? AND user_id = ?",
    TASK_COLUMNS
);

pub const CHECK_TASK_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?)";

// ============================================================================
// Thread Queries
// ============================================================================

pub const THREAD_COLUMNS: &str = "id, task_id, type, role, content, created_at";

/// Chronological conversation order. The id tie-break keeps entries written
/// within the same clock tick stable.
pub const SELECT_THREADS_FOR_TASK: &str = const_format::formatcp!(
    "SELECT {} FROM ai_threads WHERE task_id = ? ORDER BY created_at ASC, id ASC",
    THREAD_COLUMNS
);

pub const SELECT_THREAD_BY_ID: &str =
    const_format::formatcp!("SELECT {} FROM ai_threads WHERE id = ?", THREAD_COLUMNS);

// ============================================================================
// User Queries
// ============================================================================

pub const USER_COLUMNS: &str = "id, email, name, created_at";

pub const SELECT_USER_BY_ID: &str =
    const_format::formatcp!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);

pub const SELECT_USER_BY_EMAIL: &str =
    const_format::formatcp!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);

// ============================================================================
// Job Queries
// ============================================================================

pub const JOB_COLUMNS: &str = "id, name, payload, state, attempts, stalled_count, locked_until, last_error, created_at, updated_at, finished_at";

pub const SELECT_JOB_BY_ID: &str =
    const_format::formatcp!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
