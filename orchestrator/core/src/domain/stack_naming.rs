// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Stack container naming conventions.
//!
//! A compose stack has no single canonical container name, so matching live
//! containers to a stack id is best-effort. The resolver is a trait so a
//! deployment with stronger naming guarantees can plug in its own.

use crate::domain::runtime::LiveContainer;

pub trait StackContainerResolver: Send + Sync {
    /// Containers belonging to the stack `app_id`, most canonical first.
    fn resolve<'a>(&self, app_id: &str, containers: &'a [LiveContainer]) -> Vec<&'a LiveContainer>;

    /// Compose services that should receive shared-folder mounts.
    fn media_targets(&self, app_id: &str, services: &[String]) -> Vec<String>;
}

/// `{id}_server`, then `{id}-app`, then `{id}` itself, then any
/// `{id}-*` / `{id}_*` prefix match.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamingConventionResolver;

impl NamingConventionResolver {
    fn rank(app_id: &str, name: &str) -> Option<u8> {
        let name = name.trim_start_matches('/');
        if name == format!("{}_server", app_id) {
            Some(0)
        } else if name == format!("{}-app", app_id) {
            Some(1)
        } else if name == app_id {
            Some(2)
        } else if name
            .strip_prefix(app_id)
            .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('_'))
        {
            Some(3)
        } else {
            None
        }
    }
}

impl StackContainerResolver for NamingConventionResolver {
    fn resolve<'a>(&self, app_id: &str, containers: &'a [LiveContainer]) -> Vec<&'a LiveContainer> {
        let mut ranked: Vec<(u8, &LiveContainer)> = containers
            .iter()
            .filter_map(|c| Self::rank(app_id, &c.name).map(|rank| (rank, c)))
            .collect();
        ranked.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.name.cmp(&b.name)));
        ranked.into_iter().map(|(_, c)| c).collect()
    }

    fn media_targets(&self, app_id: &str, services: &[String]) -> Vec<String> {
        let preferred = [
            app_id.to_string(),
            format!("{}_server", app_id),
            format!("{}-server", app_id),
            format!("{}-app", app_id),
            "server".to_string(),
            "app".to_string(),
        ];
        let matched: Vec<String> = services
            .iter()
            .filter(|service| preferred.contains(service))
            .cloned()
            .collect();

        if matched.is_empty() {
            services.first().cloned().into_iter().collect()
        } else {
            matched
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runtime::ContainerState;

    fn live(name: &str) -> LiveContainer {
        LiveContainer {
            id: format!("id-{}", name),
            name: name.to_string(),
            image: "img".to_string(),
            state: ContainerState::Running,
            status: "Up".to_string(),
        }
    }

    #[test]
    fn test_resolve_orders_by_convention() {
        let containers = vec![
            live("immich-redis-1"),
            live("immich2"),
            live("immich-app"),
            live("immich_server"),
            live("plex"),
        ];
        let resolved: Vec<&str> = NamingConventionResolver
            .resolve("immich", &containers)
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(resolved, vec!["immich_server", "immich-app", "immich-redis-1"]);
    }

    #[test]
    fn test_media_targets_prefer_named_services() {
        let services = vec![
            "database".to_string(),
            "immich-server".to_string(),
            "redis".to_string(),
        ];
        assert_eq!(
            NamingConventionResolver.media_targets("immich", &services),
            vec!["immich-server".to_string()]
        );
    }

    #[test]
    fn test_media_targets_fall_back_to_first_service() {
        let services = vec!["web".to_string(), "db".to_string()];
        assert_eq!(
            NamingConventionResolver.media_targets("nextcloud", &services),
            vec!["web".to_string()]
        );
        assert!(NamingConventionResolver.media_targets("x", &[]).is_empty());
    }
}
