// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Implicit template bindings for content presenters.
//!
//! A factory node whose type is a content presenter gets its `Content*`
//! properties bound to the matching properties of the templated parent,
//! unless the factory assigns them itself. The parent-side name prefix is
//! `Content` by default and can be changed per factory node.

use smallvec::SmallVec;
use understory_property::{PropertyId, PropertyRegistry};
use understory_scene::NodeType;

use crate::error::{StyleError, StyleResult};
use crate::factory::FactoryValue;

const PRESENTER_PREFIX: &str = "Content";

/// Suffixes of the aliased properties; the empty suffix is the content itself.
const ALIASED_SUFFIXES: [&str; 4] = ["", "Template", "TemplateSelector", "StringFormat"];

/// Computes the template bindings a content presenter receives.
///
/// `content_source` is the explicit parent-side prefix. An explicit prefix
/// whose content property the template's target type does not declare is an
/// error; with the default prefix missing properties are skipped.
pub(crate) fn content_aliases(
    registry: &PropertyRegistry,
    target_type: Option<&NodeType>,
    content_source: Option<&str>,
    assigned: &[(PropertyId, FactoryValue)],
) -> StyleResult<SmallVec<[(PropertyId, FactoryValue); 4]>> {
    let prefix = content_source.unwrap_or(PRESENTER_PREFIX);
    let mut aliases = SmallVec::new();
    for suffix in ALIASED_SUFFIXES {
        let Some(presenter) = registry.by_name(&format!("{PRESENTER_PREFIX}{suffix}")) else {
            continue;
        };
        if assigned.iter().any(|(property, _)| *property == presenter) {
            continue;
        }
        let source_name = format!("{prefix}{suffix}");
        let source = registry
            .by_name(&source_name)
            .filter(|source| target_type.is_some_and(|ty| ty.declares_property(*source)));
        match source {
            Some(source) => aliases.push((presenter, FactoryValue::TemplateBinding(source))),
            None if content_source.is_some() && suffix.is_empty() => {
                return Err(StyleError::MissingAutoAliasSource { name: source_name });
            }
            None => {}
        }
    }
    Ok(aliases)
}
