// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-visible message builders shared by the backends.

pub fn image_pull_error(image_url: &str) -> String {
    format!(
        "Image {image_url} pull failed. The image url or the credentials may be incorrect."
    )
}

pub fn pod_completed(pod_id: &str) -> String {
    format!("Pod {pod_id} has successfully exited.")
}

pub fn pod_running(pod_id: &str) -> String {
    format!("Pod {pod_id} is running.")
}

pub fn pod_not_running(pod_id: &str) -> String {
    format!("Pod {pod_id} is not running.")
}

pub fn pod_generic_fail(pod_id: &str, exit_code: i64) -> String {
    format!("Pod {pod_id} exited with code {exit_code}.")
}

pub fn pod_wrong_state(pod_id: &str, pod_state: &str) -> String {
    format!("Pod {pod_id} is in a wrong state: {pod_state}.")
}

pub fn pod_unexpected(pod_id: &str, pod_state: &str) -> String {
    format!("Pod {pod_id} is in an unexpected state: {pod_state}.")
}
