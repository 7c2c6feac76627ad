//! Compute instance commands.
//!
//! The same argument lists are used whether they run as a build step on the
//! build service or through a local `gcloud` binary.

/// Restart policy for deployed containers.
pub const RESTART_POLICY_NEVER: &str = "never";

/// `gcloud` arguments creating an instance that runs `image`.
pub fn create_with_container_args(instance: &str, image: &str) -> Vec<String> {
    vec![
        "compute".to_string(),
        "instances".to_string(),
        "create-with-container".to_string(),
        instance.to_string(),
        "--container-image".to_string(),
        image.to_string(),
        "--container-restart-policy".to_string(),
        RESTART_POLICY_NEVER.to_string(),
    ]
}

/// `gcloud` arguments stopping an instance.
pub fn stop_instance_args(instance: &str) -> Vec<String> {
    vec![
        "compute".to_string(),
        "instances".to_string(),
        "stop".to_string(),
        instance.to_string(),
    ]
}
