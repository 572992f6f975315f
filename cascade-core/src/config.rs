//! Runtime configuration.
//!
//! Plain flags live in [`ConfigOptions`], which can be deserialized from JSON
//! so an embedding application can keep them next to the rest of its
//! settings. Hooks (the structural comparer and the reaction error handler)
//! cannot be serialized and are attached with builder methods.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::reactive::Reaction;
use crate::value::Value;

/// How strictly writes to observed state must happen inside actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforceActions {
    /// Never diagnose.
    Never,
    /// Diagnose writes to state that currently has observers.
    #[default]
    Observed,
    /// Diagnose every write outside an action.
    Always,
}

impl<'de> Deserialize<'de> for EnforceActions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Mode(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(EnforceActions::Observed),
            Repr::Flag(false) => Ok(EnforceActions::Never),
            Repr::Mode(mode) => match mode.as_str() {
                "never" => Ok(EnforceActions::Never),
                "observed" => Ok(EnforceActions::Observed),
                "always" => Ok(EnforceActions::Always),
                other => Err(serde::de::Error::custom(format!(
                    "unknown enforce_actions mode `{other}`"
                ))),
            },
        }
    }
}

pub(crate) type ReactionErrorHandler = Rc<dyn Fn(&Error, &Reaction)>;

/// Options accepted by [`Runtime::configure`](crate::Runtime::configure).
///
/// Every field is optional; unset fields keep their current value.
#[derive(Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOptions {
    pub enforce_actions: Option<EnforceActions>,
    pub computed_requires_reaction: Option<bool>,
    pub reaction_requires_observable: Option<bool>,
    pub observable_requires_reaction: Option<bool>,
    pub disable_error_boundaries: Option<bool>,
    #[serde(skip)]
    structural_comparers: Vec<(TypeId, Rc<dyn Any>)>,
    #[serde(skip)]
    reaction_error_handler: Option<ReactionErrorHandler>,
}

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse plain flags from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn enforce_actions(mut self, mode: EnforceActions) -> Self {
        self.enforce_actions = Some(mode);
        self
    }

    pub fn computed_requires_reaction(mut self, enabled: bool) -> Self {
        self.computed_requires_reaction = Some(enabled);
        self
    }

    pub fn reaction_requires_observable(mut self, enabled: bool) -> Self {
        self.reaction_requires_observable = Some(enabled);
        self
    }

    pub fn observable_requires_reaction(mut self, enabled: bool) -> Self {
        self.observable_requires_reaction = Some(enabled);
        self
    }

    pub fn disable_error_boundaries(mut self, disabled: bool) -> Self {
        self.disable_error_boundaries = Some(disabled);
        self
    }

    /// Install the comparer used by cells and computeds of type `T` that were
    /// created with [`Comparer::Structural`](crate::Comparer::Structural).
    pub fn with_structural_comparer<T: 'static>(
        mut self,
        comparer: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        let comparer: Rc<dyn Fn(&T, &T) -> bool> = Rc::new(comparer);
        self.structural_comparers
            .push((TypeId::of::<T>(), Rc::new(comparer) as Rc<dyn Any>));
        self
    }

    /// Install the hook invoked for every reaction failure.
    pub fn with_reaction_error_handler(
        mut self,
        handler: impl Fn(&Error, &Reaction) + 'static,
    ) -> Self {
        self.reaction_error_handler = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for ConfigOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOptions")
            .field("enforce_actions", &self.enforce_actions)
            .field("computed_requires_reaction", &self.computed_requires_reaction)
            .field("reaction_requires_observable", &self.reaction_requires_observable)
            .field("observable_requires_reaction", &self.observable_requires_reaction)
            .field("disable_error_boundaries", &self.disable_error_boundaries)
            .field("structural_comparers", &self.structural_comparers.len())
            .field("reaction_error_handler", &self.reaction_error_handler.is_some())
            .finish()
    }
}

/// The effective configuration of one runtime.
pub struct Config {
    pub enforce_actions: EnforceActions,
    pub computed_requires_reaction: bool,
    pub reaction_requires_observable: bool,
    pub observable_requires_reaction: bool,
    pub disable_error_boundaries: bool,
    structural_comparers: HashMap<TypeId, Rc<dyn Any>>,
    reaction_error_handler: Option<ReactionErrorHandler>,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            enforce_actions: EnforceActions::default(),
            computed_requires_reaction: false,
            reaction_requires_observable: false,
            observable_requires_reaction: false,
            disable_error_boundaries: false,
            structural_comparers: HashMap::new(),
            reaction_error_handler: None,
        };
        let deep: Rc<dyn Fn(&Value, &Value) -> bool> = Rc::new(Value::deep_eq);
        config
            .structural_comparers
            .insert(TypeId::of::<Value>(), Rc::new(deep) as Rc<dyn Any>);
        config
    }
}

impl Config {
    pub(crate) fn apply(&mut self, options: ConfigOptions) {
        let ConfigOptions {
            enforce_actions,
            computed_requires_reaction,
            reaction_requires_observable,
            observable_requires_reaction,
            disable_error_boundaries,
            structural_comparers,
            reaction_error_handler,
        } = options;

        if let Some(mode) = enforce_actions {
            self.enforce_actions = mode;
        }
        if let Some(flag) = computed_requires_reaction {
            self.computed_requires_reaction = flag;
        }
        if let Some(flag) = reaction_requires_observable {
            self.reaction_requires_observable = flag;
        }
        if let Some(flag) = observable_requires_reaction {
            self.observable_requires_reaction = flag;
        }
        if let Some(flag) = disable_error_boundaries {
            self.disable_error_boundaries = flag;
        }
        for (type_id, comparer) in structural_comparers {
            self.structural_comparers.insert(type_id, comparer);
        }
        if reaction_error_handler.is_some() {
            self.reaction_error_handler = reaction_error_handler;
        }
    }

    pub(crate) fn structural_comparer<T: 'static>(&self) -> Option<Rc<dyn Fn(&T, &T) -> bool>> {
        self.structural_comparers
            .get(&TypeId::of::<T>())
            .and_then(|any| any.downcast_ref::<Rc<dyn Fn(&T, &T) -> bool>>())
            .cloned()
    }

    pub(crate) fn reaction_error_handler(&self) -> Option<ReactionErrorHandler> {
        self.reaction_error_handler.clone()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("enforce_actions", &self.enforce_actions)
            .field("computed_requires_reaction", &self.computed_requires_reaction)
            .field("reaction_requires_observable", &self.reaction_requires_observable)
            .field("observable_requires_reaction", &self.observable_requires_reaction)
            .field("disable_error_boundaries", &self.disable_error_boundaries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_parse_from_json() {
        let options = ConfigOptions::from_json(
            r#"{ "enforce_actions": "always", "disable_error_boundaries": true }"#,
        )
        .unwrap();

        assert_eq!(options.enforce_actions, Some(EnforceActions::Always));
        assert_eq!(options.disable_error_boundaries, Some(true));
        assert_eq!(options.computed_requires_reaction, None);
    }

    #[test]
    fn enforce_actions_accepts_booleans() {
        let on = ConfigOptions::from_json(r#"{ "enforce_actions": true }"#).unwrap();
        let off = ConfigOptions::from_json(r#"{ "enforce_actions": false }"#).unwrap();

        assert_eq!(on.enforce_actions, Some(EnforceActions::Observed));
        assert_eq!(off.enforce_actions, Some(EnforceActions::Never));
    }

    #[test]
    fn unknown_options_are_rejected() {
        let err = ConfigOptions::from_json(r#"{ "isolate_global_state": true }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn apply_keeps_unset_fields() {
        let mut config = Config::default();
        config.apply(ConfigOptions::new().enforce_actions(EnforceActions::Never));
        config.apply(ConfigOptions::new().computed_requires_reaction(true));

        assert_eq!(config.enforce_actions, EnforceActions::Never);
        assert!(config.computed_requires_reaction);
    }

    #[test]
    fn structural_comparers_are_keyed_by_type() {
        let mut config = Config::default();
        config.apply(ConfigOptions::new().with_structural_comparer(|a: &i32, b: &i32| {
            a.abs() == b.abs()
        }));

        let ints = config.structural_comparer::<i32>().unwrap();
        assert!(ints(&-3, &3));
        assert!(config.structural_comparer::<u8>().is_none());
        assert!(config.structural_comparer::<Value>().is_some());
    }
}
