labeled_enum! {
    /// Workflow bucket of a Work item. Also names the directory it lives in.
    pub enum Schedule as "schedule" {
        Now => "now",
        Next => "next",
        Later => "later" | "backlog",
        Closed => "closed" | "done",
    }
}

impl Schedule {
    pub fn dir_name(self) -> &'static str {
        self.as_str()
    }

    pub fn is_closed(self) -> bool {
        self == Schedule::Closed
    }
}

labeled_enum! {
    pub enum WorkStatus as "work status" {
        Active => "active" | "todo",
        InProgress => "in_progress" | "started",
        Blocked => "blocked",
        Completed => "completed" | "done",
        Canceled => "canceled" | "cancelled",
        Archived => "archived",
    }
}

impl WorkStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkStatus::Completed | WorkStatus::Canceled | WorkStatus::Archived
        )
    }
}

labeled_enum! {
    /// Declaration order is sort order: critical work lists first.
    pub enum Priority as "priority" {
        Critical => "critical" | "p0",
        High => "high" | "p1",
        Medium => "medium" | "p2",
        Low => "low" | "p3",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}
