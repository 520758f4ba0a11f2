//! Well-known record store paths

pub const HISTORY: &str = "deployments/history";
pub const APPROVALS: &str = "deployments/approvals";
pub const BUILD_CACHE: &str = "deployments/buildCache";
pub const NOTIFICATIONS: &str = "deployments/notifications";

pub fn deployment(id: &str) -> String {
    format!("{}/{}", HISTORY, id)
}

pub fn deployment_logs(id: &str, stage: &str) -> String {
    format!("{}/{}/logs/{}", HISTORY, id, stage)
}

pub fn approval(id: &str) -> String {
    format!("{}/{}", APPROVALS, id)
}

pub fn cache_entry(key: &str) -> String {
    format!("{}/{}", BUILD_CACHE, key)
}

pub fn notification(id: &str) -> String {
    format!("{}/{}", NOTIFICATIONS, id)
}
