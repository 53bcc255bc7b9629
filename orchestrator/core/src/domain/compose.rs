// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Compose document augmentation.
//!
//! Shared folders are added to a stack as read-only bind mounts by editing
//! the parsed YAML tree, never by string splicing. When no share is
//! authorized the original text is returned untouched, comments included.
//!
//! [`host_access`] lists the parts of a compose document that reach the host
//! outside the stack directory; only administrators may install those.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use thiserror::Error;

use crate::domain::shared_folder::MountedShare;
use crate::domain::stack_naming::StackContainerResolver;

/// Manifest written next to the compose file, recording what was injected.
pub const MEDIA_MANIFEST_FILE: &str = "media-mounts.json";

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Invalid compose document: {0}")]
    Parse(String),

    #[error("Compose document defines no services")]
    NoServices,

    #[error("Service '{service}' has a malformed volumes section")]
    MalformedVolumes { service: String },

    #[error("Failed to render compose document: {0}")]
    Render(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaManifest {
    pub services: Vec<String>,
    pub shares: Vec<MountedShare>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentedCompose {
    pub content: String,
    pub manifest: MediaManifest,
}

/// Service names in document order.
pub fn service_names(document: &Value) -> Vec<String> {
    document
        .get("services")
        .and_then(Value::as_mapping)
        .map(|services| {
            services
                .iter()
                .filter_map(|(key, _)| key.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Add `shares` as read-only volumes to the media-target services chosen by
/// `resolver`. Already present volume entries are not duplicated.
pub fn inject_media_mounts(
    compose: &str,
    app_id: &str,
    shares: &[MountedShare],
    resolver: &dyn StackContainerResolver,
) -> Result<AugmentedCompose, ComposeError> {
    let mut document: Value =
        serde_yaml::from_str(compose).map_err(|e| ComposeError::Parse(e.to_string()))?;

    let names = service_names(&document);
    if names.is_empty() {
        return Err(ComposeError::NoServices);
    }

    if shares.is_empty() {
        return Ok(AugmentedCompose {
            content: compose.to_string(),
            manifest: MediaManifest {
                services: Vec::new(),
                shares: Vec::new(),
            },
        });
    }

    let targets = resolver.media_targets(app_id, &names);
    let services = document
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
        .ok_or(ComposeError::NoServices)?;

    for target in &targets {
        let Some(service) = services.get_mut(target.as_str()) else {
            continue;
        };
        if service.is_null() {
            *service = Value::Mapping(Mapping::new());
        }
        let Some(definition) = service.as_mapping_mut() else {
            return Err(ComposeError::Parse(format!(
                "service '{}' is not a mapping",
                target
            )));
        };

        let volumes_key = Value::String("volumes".to_string());
        if !definition.contains_key(&volumes_key) {
            definition.insert(volumes_key.clone(), Value::Sequence(Vec::new()));
        }
        let Some(Value::Sequence(volumes)) = definition.get_mut(&volumes_key) else {
            return Err(ComposeError::MalformedVolumes {
                service: target.clone(),
            });
        };

        for share in shares {
            let entry = Value::String(share.bind_spec());
            if !volumes.contains(&entry) {
                volumes.push(entry);
            }
        }
    }

    let content =
        serde_yaml::to_string(&document).map_err(|e| ComposeError::Render(e.to_string()))?;

    Ok(AugmentedCompose {
        content,
        manifest: MediaManifest {
            services: targets,
            shares: shares.to_vec(),
        },
    })
}

/// A compose feature that reaches host resources outside the stack's own
/// directory and the shares mounted for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAccess {
    Privileged { service: String },
    Namespace { service: String, key: String, value: String },
    Devices { service: String },
    Capabilities { service: String },
    HostPath { owner: String, path: String },
    VolumeDriverOptions { volume: String },
}

impl fmt::Display for HostAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAccess::Privileged { service } => write!(f, "service '{}' is privileged", service),
            HostAccess::Namespace {
                service,
                key,
                value,
            } => write!(f, "service '{}' sets {}: {}", service, key, value),
            HostAccess::Devices { service } => write!(f, "service '{}' maps host devices", service),
            HostAccess::Capabilities { service } => {
                write!(f, "service '{}' adds capabilities", service)
            }
            HostAccess::HostPath { owner, path } => {
                write!(f, "{} references host path {}", owner, path)
            }
            HostAccess::VolumeDriverOptions { volume } => {
                write!(f, "volume '{}' sets driver_opts", volume)
            }
        }
    }
}

/// Everything in `compose` that reaches the host beyond the stack directory.
/// Relative paths under the stack directory and named volumes are fine;
/// absolute, home-relative, interpolated or `..` paths are not.
pub fn host_access(compose: &str) -> Result<Vec<HostAccess>, ComposeError> {
    let mut document: Value =
        serde_yaml::from_str(compose).map_err(|e| ComposeError::Parse(e.to_string()))?;
    document
        .apply_merge()
        .map_err(|e| ComposeError::Parse(e.to_string()))?;

    let mut found = Vec::new();

    if let Some(services) = field(&document, "services").and_then(Value::as_mapping) {
        for (name, service) in services {
            let name = name.as_str().unwrap_or_default();
            inspect_service(name, untag(service), &mut found);
        }
    }

    if let Some(include) = field(&document, "include") {
        check_string_leaves("include", include, &mut found);
    }

    for kind in ["configs", "secrets"] {
        let Some(entries) = field(&document, kind).and_then(Value::as_mapping) else {
            continue;
        };
        for (name, definition) in entries {
            if let Some(file) = field(untag(definition), "file") {
                let owner = format!("{} '{}'", kind, name.as_str().unwrap_or_default());
                check_string_leaves(&owner, file, &mut found);
            }
        }
    }

    if let Some(volumes) = field(&document, "volumes").and_then(Value::as_mapping) {
        for (name, definition) in volumes {
            if field(untag(definition), "driver_opts").is_some() {
                found.push(HostAccess::VolumeDriverOptions {
                    volume: name.as_str().unwrap_or_default().to_string(),
                });
            }
        }
    }

    Ok(found)
}

fn inspect_service(name: &str, service: &Value, found: &mut Vec<HostAccess>) {
    let service_name = || name.to_string();

    if let Some(privileged) = field(service, "privileged") {
        if !matches!(privileged, Value::Bool(false)) {
            found.push(HostAccess::Privileged {
                service: service_name(),
            });
        }
    }

    for key in ["pid", "ipc", "userns_mode", "cgroup"] {
        let Some(value) = field(service, key) else {
            continue;
        };
        let value = scalar_text(value);
        if value == "host" || value.starts_with("container:") || value.contains('$') {
            found.push(HostAccess::Namespace {
                service: service_name(),
                key: key.to_string(),
                value,
            });
        }
    }

    if let Some(Value::Sequence(volumes_from)) = field(service, "volumes_from") {
        for entry in volumes_from {
            let value = scalar_text(untag(entry));
            if value.starts_with("container:") || value.contains('$') {
                found.push(HostAccess::Namespace {
                    service: service_name(),
                    key: "volumes_from".to_string(),
                    value,
                });
            }
        }
    }

    for key in ["devices", "device_cgroup_rules"] {
        if field(service, key).is_some_and(is_non_empty) {
            found.push(HostAccess::Devices {
                service: service_name(),
            });
        }
    }

    if field(service, "cap_add").is_some_and(is_non_empty) {
        found.push(HostAccess::Capabilities {
            service: service_name(),
        });
    }

    if let Some(Value::Sequence(volumes)) = field(service, "volumes") {
        let owner = format!("service '{}' volumes", name);
        for volume in volumes {
            match untag(volume) {
                Value::String(short) => {
                    let mut parts = short.split(':');
                    let source = parts.next().unwrap_or_default();
                    if parts.next().is_some() && is_host_path(source) {
                        found.push(HostAccess::HostPath {
                            owner: owner.clone(),
                            path: source.to_string(),
                        });
                    }
                }
                long => {
                    if let Some(source) = field(long, "source") {
                        check_string_leaves(&owner, source, found);
                    }
                }
            }
        }
    }

    if let Some(build) = field(service, "build") {
        let owner = format!("service '{}' build", name);
        match build {
            Value::Mapping(_) => {
                for key in ["context", "additional_contexts"] {
                    if let Some(value) = field(build, key) {
                        check_string_leaves(&owner, value, found);
                    }
                }
            }
            other => check_string_leaves(&owner, other, found),
        }
    }

    if let Some(env_file) = field(service, "env_file") {
        check_string_leaves(&format!("service '{}' env_file", name), env_file, found);
    }

    if let Some(file) = field(service, "extends").and_then(|extends| field(extends, "file")) {
        check_string_leaves(&format!("service '{}' extends", name), file, found);
    }
}

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).map(untag).filter(|v| !v.is_null())
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn check_string_leaves(owner: &str, value: &Value, found: &mut Vec<HostAccess>) {
    match untag(value) {
        Value::String(path) if is_host_path(path) => found.push(HostAccess::HostPath {
            owner: owner.to_string(),
            path: path.clone(),
        }),
        Value::Sequence(items) => {
            for item in items {
                check_string_leaves(owner, item, found);
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map {
                check_string_leaves(owner, item, found);
            }
        }
        _ => {}
    }
}

fn is_host_path(path: &str) -> bool {
    path.starts_with('/')
        || path.starts_with('~')
        || path.starts_with('\\')
        || path.contains('$')
        || path.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stack_naming::NamingConventionResolver;
    use std::path::PathBuf;

    const IMMICH: &str = r#"
services:
  immich-server:
    image: ghcr.io/immich-app/immich-server:release
    volumes:
      - ./library:/usr/src/app/upload
  database:
    image: postgres:14
"#;

    fn share(name: &str) -> MountedShare {
        MountedShare {
            name: name.to_string(),
            host_path: PathBuf::from(format!("/srv/{}", name)),
        }
    }

    fn volumes_of(content: &str, service: &str) -> Vec<String> {
        let doc: Value = serde_yaml::from_str(content).unwrap();
        doc["services"][service]["volumes"]
            .as_sequence()
            .map(|seq| {
                seq.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_mounts_land_on_server_service_only() {
        let out = inject_media_mounts(IMMICH, "immich", &[share("photos")], &NamingConventionResolver)
            .unwrap();

        assert_eq!(
            volumes_of(&out.content, "immich-server"),
            vec![
                "./library:/usr/src/app/upload".to_string(),
                "/srv/photos:/media/photos:ro".to_string(),
            ]
        );
        assert!(volumes_of(&out.content, "database").is_empty());
        assert_eq!(out.manifest.services, vec!["immich-server".to_string()]);
    }

    #[test]
    fn test_injection_is_idempotent() {
        let first = inject_media_mounts(IMMICH, "immich", &[share("photos")], &NamingConventionResolver)
            .unwrap();
        let second = inject_media_mounts(
            &first.content,
            "immich",
            &[share("photos")],
            &NamingConventionResolver,
        )
        .unwrap();
        assert_eq!(volumes_of(&second.content, "immich-server").len(), 2);
    }

    #[test]
    fn test_no_shares_keeps_text() {
        let out = inject_media_mounts(IMMICH, "immich", &[], &NamingConventionResolver).unwrap();
        assert_eq!(out.content, IMMICH);
        assert!(out.manifest.shares.is_empty());
    }

    #[test]
    fn test_rejects_documents_without_services() {
        assert!(matches!(
            inject_media_mounts("version: '3'\n", "x", &[], &NamingConventionResolver),
            Err(ComposeError::NoServices)
        ));
        assert!(matches!(
            inject_media_mounts("services: [", "x", &[], &NamingConventionResolver),
            Err(ComposeError::Parse(_))
        ));
    }

    #[test]
    fn test_plain_stack_has_no_host_access() {
        let compose = r#"
services:
  app:
    image: nginx
    privileged: false
    network_mode: host
    volumes:
      - ./data:/data
      - cache:/cache
      - /anonymous
      - type: volume
        source: cache
        target: /more
    build: ./web
    env_file: .env
volumes:
  cache: {}
"#;
        assert_eq!(host_access(compose).unwrap(), Vec::new());
    }

    #[test]
    fn test_host_root_and_privileged_detected() {
        let compose = r#"
services:
  shell:
    image: alpine
    privileged: true
    volumes:
      - /:/host
      - ~/.ssh:/ssh:ro
      - ../../etc:/etc-copy
      - ${HOST_DIR}:/data
      - type: bind
        source: /var/run/docker.sock
        target: /var/run/docker.sock
"#;
        let found = host_access(compose).unwrap();
        assert!(found.contains(&HostAccess::Privileged {
            service: "shell".to_string()
        }));
        let paths: Vec<_> = found
            .iter()
            .filter_map(|f| match f {
                HostAccess::HostPath { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            paths,
            vec!["/", "~/.ssh", "../../etc", "${HOST_DIR}", "/var/run/docker.sock"]
        );
    }

    #[test]
    fn test_indirect_host_access_detected() {
        let compose = r#"
x-escalate: &escalate
  privileged: true
services:
  a:
    <<: *escalate
    image: alpine
  b:
    image: alpine
    pid: host
    devices:
      - /dev/sda:/dev/sda
    cap_add: [SYS_ADMIN]
    env_file: /etc/shadow
    build:
      context: /
  c:
    image: alpine
    volumes_from:
      - container:immich_server
volumes:
  rootfs:
    driver: local
    driver_opts:
      type: none
      o: bind
      device: /
secrets:
  key:
    file: /root/.ssh/id_rsa
"#;
        let found = host_access(compose).unwrap();
        assert!(found.contains(&HostAccess::Privileged {
            service: "a".to_string()
        }));
        assert!(found.iter().any(|f| matches!(f, HostAccess::Namespace { key, .. } if key == "pid")));
        assert!(found
            .iter()
            .any(|f| matches!(f, HostAccess::Namespace { key, .. } if key == "volumes_from")));
        assert!(found.contains(&HostAccess::Devices {
            service: "b".to_string()
        }));
        assert!(found.contains(&HostAccess::Capabilities {
            service: "b".to_string()
        }));
        assert!(found.contains(&HostAccess::VolumeDriverOptions {
            volume: "rootfs".to_string()
        }));
        for path in ["/etc/shadow", "/", "/root/.ssh/id_rsa"] {
            assert!(
                found
                    .iter()
                    .any(|f| matches!(f, HostAccess::HostPath { path: p, .. } if p == path)),
                "{path}"
            );
        }
    }
}
