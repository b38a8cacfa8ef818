//! Per-kind resource checks (spec §4.5 step 3): the handful of Kubernetes
//! object shapes common enough to validate structurally rather than leave
//! to the cluster's own admission control.

use regex::Regex;

use crate::model::{Resource, Value};

#[derive(Clone, Debug)]
pub struct KindIssue {
    pub message: String,
}

fn issue(message: impl Into<String>) -> KindIssue {
    KindIssue { message: message.into() }
}

fn hostname_re() -> Regex {
    Regex::new(r"^(?:[a-z0-9]([-a-z0-9]*[a-z0-9])?\.)*[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap()
}

/// Runs the check matching `resource.kind` (spec §4.5 step 3). Kinds with no
/// specific check pass silently.
pub fn check(resource: &Resource) -> (Vec<KindIssue>, Vec<KindIssue>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    match resource.kind.as_str() {
        "Deployment" | "StatefulSet" | "DaemonSet" => workload(resource, &mut errors),
        "Service" => service(resource, &mut errors, &mut warnings),
        "ConfigMap" | "Secret" => config_data(resource, &mut errors, &mut warnings),
        "Ingress" => ingress(resource, &mut errors),
        _ => {}
    }
    (errors, warnings)
}

fn path<'a>(object: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = object;
    for seg in segments {
        current = current.as_map()?.get(*seg)?;
    }
    Some(current)
}

fn workload(resource: &Resource, errors: &mut Vec<KindIssue>) {
    let spec = match path(&resource.object, &["spec"]) {
        Some(s) => s,
        None => {
            errors.push(issue(format!("{} '{}' missing spec", resource.kind, resource.metadata.name)));
            return;
        }
    };
    if path(spec, &["selector"]).is_none() {
        errors.push(issue(format!("{} '{}' missing spec.selector", resource.kind, resource.metadata.name)));
    }
    let template = match path(spec, &["template"]) {
        Some(t) => t,
        None => {
            errors.push(issue(format!("{} '{}' missing spec.template", resource.kind, resource.metadata.name)));
            return;
        }
    };
    let containers = path(template, &["spec", "containers"]).and_then(Value::as_list);
    match containers {
        Some(list) if !list.is_empty() => {
            for (i, c) in list.iter().enumerate() {
                let fields = c.as_map();
                let name = fields.and_then(|m| m.get("name")).and_then(Value::as_str);
                let image = fields.and_then(|m| m.get("image")).and_then(Value::as_str);
                if name.is_none() {
                    errors.push(issue(format!(
                        "{} '{}' container[{}] missing name",
                        resource.kind, resource.metadata.name, i
                    )));
                }
                if image.is_none() {
                    errors.push(issue(format!(
                        "{} '{}' container[{}] missing image",
                        resource.kind, resource.metadata.name, i
                    )));
                }
            }
        }
        _ => errors.push(issue(format!("{} '{}' has no containers", resource.kind, resource.metadata.name))),
    }
}

fn service(resource: &Resource, errors: &mut Vec<KindIssue>, warnings: &mut Vec<KindIssue>) {
    let spec = match path(&resource.object, &["spec"]) {
        Some(s) => s,
        None => {
            errors.push(issue(format!("Service '{}' missing spec", resource.metadata.name)));
            return;
        }
    };
    if path(spec, &["selector"]).is_none() {
        warnings.push(issue(format!("Service '{}' has no selector", resource.metadata.name)));
    }
    let ports = path(spec, &["ports"]).and_then(Value::as_list).cloned().unwrap_or_default();
    for (i, p) in ports.iter().enumerate() {
        let port = p.as_map().and_then(|m| m.get("port"));
        match port {
            Some(Value::Int(n)) if (1..=65535).contains(n) => {}
            _ => errors.push(issue(format!(
                "Service '{}' port[{}] out of range 1..65535",
                resource.metadata.name, i
            ))),
        }
    }
}

fn config_data(resource: &Resource, errors: &mut Vec<KindIssue>, warnings: &mut Vec<KindIssue>) {
    let data = path(&resource.object, &["data"]);
    let string_data = path(&resource.object, &["stringData"]);
    if data.is_none() && string_data.is_none() {
        errors.push(issue(format!("{} '{}' has no data section", resource.kind, resource.metadata.name)));
    }
    if string_data.is_some() {
        warnings.push(issue(format!("{} '{}' uses stringData", resource.kind, resource.metadata.name)));
    }
}

fn ingress(resource: &Resource, errors: &mut Vec<KindIssue>) {
    let rules = path(&resource.object, &["spec", "rules"]).and_then(Value::as_list).cloned().unwrap_or_default();
    for (i, rule) in rules.iter().enumerate() {
        if let Some(host) = rule.as_map().and_then(|m| m.get("host")).and_then(Value::as_str) {
            if !hostname_re().is_match(host) {
                errors.push(issue(format!("Ingress '{}' rule[{}] invalid host '{}'", resource.metadata.name, i, host)));
            }
        }
    }
}
