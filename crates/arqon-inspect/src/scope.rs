use arqon_config::CasilScopeConfig;
use globset::Glob;

/// `fnmatch`-style match: a trailing `*` is treated as a plain prefix match,
/// otherwise the whole pattern is compiled as a glob.
fn matches_pattern(pattern: &str, candidate: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        if !prefix.contains('*') && !prefix.contains('?') && !prefix.contains('[') {
            return candidate.starts_with(prefix);
        }
    }
    match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(candidate),
        Err(_) => pattern == candidate,
    }
}

pub fn matches_any(patterns: &[String], candidate: &str) -> bool {
    patterns.iter().any(|p| matches_pattern(p, candidate))
}

/// Decides whether an envelope's room/channel falls inside the inspection
/// scope. A disabled gate is always out of scope; an enabled gate with no
/// include list inspects everything not explicitly excluded.
pub fn in_scope(scope: &CasilScopeConfig, room: Option<&str>, channel: Option<&str>, enabled: bool) -> bool {
    if !enabled {
        return false;
    }

    let room_channel = match (room, channel) {
        (Some(r), Some(c)) => format!("{r}:{c}"),
        (Some(r), None) => r.to_string(),
        (None, Some(c)) => c.to_string(),
        (None, None) => String::new(),
    };

    if room_channel.is_empty() {
        return false;
    }

    if matches_any(&scope.exclude, &room_channel) {
        return false;
    }

    if !scope.include.is_empty() {
        return matches_any(&scope.include, &room_channel);
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_gate_is_never_in_scope() {
        let scope = CasilScopeConfig::default();
        assert!(!in_scope(&scope, Some("science"), Some("general"), false));
    }

    #[test]
    fn exclude_wins_over_include() {
        let scope = CasilScopeConfig {
            include: vec!["science:*".to_string()],
            exclude: vec!["science:debug".to_string()],
        };
        assert!(!in_scope(&scope, Some("science"), Some("debug"), true));
        assert!(in_scope(&scope, Some("science"), Some("general"), true));
    }

    #[test]
    fn empty_include_inspects_everything_enabled() {
        let scope = CasilScopeConfig::default();
        assert!(in_scope(&scope, Some("science"), Some("general"), true));
    }

    #[test]
    fn missing_room_and_channel_is_out_of_scope() {
        let scope = CasilScopeConfig::default();
        assert!(!in_scope(&scope, None, None, true));
    }
}
