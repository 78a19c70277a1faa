//! Generic handler for intercepted calls
//!
//! Every redirected method forwards into [`handle`], which runs the
//! registered interceptors around (or instead of) the preserved original.

use super::callback::CallContext;
use super::registry::{InterceptorRecord, RegistryEntry, ScopeKey};
use super::{EngineOptions, EngineShared, Timing};
use crate::runtime::{dispatch, Class, Imp, Invocation, Receiver, RuntimeError, RuntimeResult, Selector};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Phases of an intercepted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Call received
    Entered,
    /// Before interceptors ran
    BeforeRun,
    /// Instead interceptors ran in place of the original
    Instead,
    /// The original implementation ran
    Original,
    /// After interceptors ran
    AfterRun,
    /// Control is about to return to the caller
    Returned,
}

/// Forwarding handler that routes into the engine
///
/// The handler holds the engine weakly. Once the engine is gone, intercepted
/// methods fall straight through to their preserved originals.
pub(crate) fn forwarder(shared: &Arc<EngineShared>) -> Imp {
    let engine: Weak<EngineShared> = Arc::downgrade(shared);
    let options = shared.options.clone();
    Imp::forwarder(move |invocation| match engine.upgrade() {
        Some(shared) => handle(&shared, invocation),
        None => passthrough(&options, invocation),
    })
}

/// Run an intercepted call
pub(crate) fn handle(shared: &EngineShared, invocation: &mut Invocation) -> RuntimeResult<()> {
    let selector = invocation.selector().clone();
    let alias = shared.options.alias(&selector);
    let isa = invocation.target().isa();
    trace!(phase = ?Phase::Entered, selector = %selector, class = %isa.name());

    if isa.instance_method(&alias).is_none() {
        return unhandled(&shared.options, &isa, invocation);
    }

    let entries = resolve_entries(shared, invocation.target(), &isa, &selector, &alias);
    let before = collect(entries.iter(), Timing::Before);
    let instead = collect(entries.iter(), Timing::Instead);
    let after = collect(entries.iter().rev(), Timing::After);

    let ctx = CallContext::new(invocation, alias);
    for record in &before {
        record.callback().call(&ctx)?;
    }
    trace!(phase = ?Phase::BeforeRun, count = before.len());

    if instead.is_empty() {
        ctx.invoke_original()?;
        trace!(phase = ?Phase::Original);
    } else {
        for record in &instead {
            record.callback().call(&ctx)?;
        }
        trace!(phase = ?Phase::Instead, count = instead.len());
    }

    for record in &after {
        record.callback().call(&ctx)?;
    }
    trace!(phase = ?Phase::AfterRun, count = after.len());
    trace!(phase = ?Phase::Returned, selector = %selector);
    Ok(())
}

/// Entries that apply to a call, most specific first
///
/// The instance entry comes first. Type entries follow for each class on
/// the dispatch chain, from the most derived up to the class that supplies
/// the implementation; generated shadow classes are skipped.
fn resolve_entries(
    shared: &EngineShared,
    target: &Receiver,
    isa: &Class,
    selector: &Selector,
    alias: &Selector,
) -> Vec<Arc<RegistryEntry>> {
    let mut entries = Vec::new();
    if let Receiver::Object(object) = target {
        entries.extend(shared.registry.lookup(ScopeKey::Instance(object.id()), alias));
    }
    for class in isa.ancestors() {
        if shared.options.is_shadow_name(class.name()) {
            continue;
        }
        entries.extend(shared.registry.lookup(ScopeKey::Type(class.id()), selector));
        if supplies_implementation(&class, selector, alias) {
            break;
        }
    }
    entries
}

/// Check whether `class` overrides the implementation it would inherit
///
/// Redirecting an inherited method copies the inherited body under the
/// alias; such a class does not override anything, so the walk continues.
fn supplies_implementation(class: &Class, selector: &Selector, alias: &Selector) -> bool {
    let Some(own) = class.own_method(alias).or_else(|| class.own_method(selector)) else {
        return false;
    };
    let inherited = class
        .superclass()
        .and_then(|parent| parent.instance_method(alias).or_else(|| parent.instance_method(selector)));
    match inherited {
        Some(inherited) => !inherited.imp().same_as(own.imp()),
        None => true,
    }
}

fn collect<'a>(
    entries: impl Iterator<Item = &'a Arc<RegistryEntry>>,
    timing: Timing,
) -> Vec<Arc<InterceptorRecord>> {
    entries
        .flat_map(|entry| entry.snapshot(timing))
        .filter(|record| record.is_live())
        .collect()
}

/// Forwarded call with no preserved original: hand it to the forwarder
/// that was in place before interception
///
/// Without one the call fails the same way it would on an unhooked object.
fn unhandled(options: &EngineOptions, isa: &Class, invocation: &mut Invocation) -> RuntimeResult<()> {
    let preserved = isa
        .instance_method(&Selector::new(&options.forwarder_alias))
        .map(|method| method.imp().clone());
    match preserved {
        Some(Imp::Forwarder(handler)) => handler(invocation),
        _ => {
            let class = isa.introspection_class();
            debug!(
                selector = %invocation.selector(),
                class = %class.name(),
                "forwarded call has no implementation"
            );
            Err(RuntimeError::UnrecognizedSelector {
                selector: invocation.selector().to_string(),
                class: class.name().to_string(),
            })
        }
    }
}

fn passthrough(options: &EngineOptions, invocation: &mut Invocation) -> RuntimeResult<()> {
    let selector = invocation.selector().clone();
    let alias = options.alias(&selector);
    let isa = invocation.target().isa();
    if isa.instance_method(&alias).is_none() {
        return unhandled(options, &isa, invocation);
    }
    invocation.set_selector(alias);
    let result = dispatch(invocation);
    invocation.set_selector(selector);
    result
}
