use std::collections::BTreeMap;

use tracing::debug;

use super::host::{SceneHost, VisualElement};

/// Bump whenever a rule is added, removed, or reordered.
pub const CLEANUP_TABLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OverlayCategory {
    Mask,
    TutorialMask,
    SolidBlack,
    Vignette,
    HeroLight,
    Unmasker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementMatcher {
    NamePrefix(String),
    NameContainsIgnoreCase(String),
    NameExact(String),
    Controller(String),
}

impl ElementMatcher {
    fn matches(&self, element: &VisualElement) -> bool {
        match self {
            Self::NamePrefix(prefix) => element.name.starts_with(prefix.as_str()),
            Self::NameContainsIgnoreCase(needle) => element
                .name
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
            Self::NameExact(name) => element.name == *name,
            Self::Controller(name) => element.controller.as_deref() == Some(name.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRule {
    pub category: OverlayCategory,
    pub matcher: ElementMatcher,
    pub action: CleanupAction,
}

impl CleanupRule {
    pub fn deny(category: OverlayCategory, matcher: ElementMatcher) -> Self {
        Self {
            category,
            matcher,
            action: CleanupAction::Deny,
        }
    }

    pub fn allow(category: OverlayCategory, matcher: ElementMatcher) -> Self {
        Self {
            category,
            matcher,
            action: CleanupAction::Allow,
        }
    }
}

/// Ordered classification of overlay elements; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct CleanupTable {
    version: u32,
    rules: Vec<CleanupRule>,
}

impl Default for CleanupTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl CleanupTable {
    pub fn new(version: u32, rules: Vec<CleanupRule>) -> Self {
        Self { version, rules }
    }

    /// Masks, vignettes, black fade layers, hero lights and unmasker-driven overlays.
    pub fn standard() -> Self {
        use ElementMatcher::{Controller, NameContainsIgnoreCase, NameExact, NamePrefix};
        use OverlayCategory::*;

        let rules = vec![
            CleanupRule::deny(Mask, NamePrefix("msk_".to_string())),
            CleanupRule::deny(TutorialMask, NamePrefix("Tut_msk".to_string())),
            CleanupRule::deny(SolidBlack, NamePrefix("black_solid".to_string())),
            CleanupRule::deny(Vignette, NameContainsIgnoreCase("vignette".to_string())),
            CleanupRule::deny(HeroLight, NameExact("HeroLight".to_string())),
            CleanupRule::deny(HeroLight, NameExact("white_light_donut".to_string())),
            CleanupRule::deny(Unmasker, Controller("unmasker".to_string())),
            CleanupRule::deny(Unmasker, Controller("remasker_inverse".to_string())),
            CleanupRule::deny(Unmasker, Controller("remasker".to_string())),
        ];
        Self::new(CLEANUP_TABLE_VERSION, rules)
    }

    /// Puts `rule` ahead of every existing rule.
    pub fn with_override(mut self, rule: CleanupRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn rules(&self) -> &[CleanupRule] {
        &self.rules
    }

    pub fn classify(&self, element: &VisualElement) -> Option<&CleanupRule> {
        self.rules.iter().find(|rule| rule.matcher.matches(element))
    }

    pub fn should_hide(&self, element: &VisualElement) -> bool {
        self.classify(element)
            .is_some_and(|rule| rule.action == CleanupAction::Deny)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub hidden: usize,
    pub by_category: BTreeMap<OverlayCategory, usize>,
}

/// Hides every currently visible element the table denies.
pub fn run_cleanup<H: SceneHost + ?Sized>(host: &mut H, table: &CleanupTable) -> CleanupSummary {
    let mut summary = CleanupSummary::default();
    for element in host.visual_elements() {
        if !element.visible {
            continue;
        }
        let Some(rule) = table.classify(&element) else {
            continue;
        };
        if rule.action != CleanupAction::Deny {
            continue;
        }
        let category = rule.category;
        host.set_element_visible(element.id, false);
        summary.hidden += 1;
        *summary.by_category.entry(category).or_insert(0) += 1;
        debug!(element = %element.name, category = ?category, "overlay_hidden");
    }
    summary
}
