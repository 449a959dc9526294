//! Links stage: relationships between migrated work items.
//!
//! Every migrated work item's source links are listed, both endpoints are
//! resolved through the work-items ledger, and each distinct
//! [`LinkSignature`] is created once. The links ledger maps signatures to
//! `"created"`, which seeds the seen-set on the next run.

use std::collections::HashSet;

use super::engine::StageRun;
use super::link_types::{
    Direction, FALLBACK_RULE, LinkRule, LinkSignature, LinkTypeResolver, lookup, outward_end,
};
use super::progress::EventCallback;
use super::types::{LinkStats, StageReport, SyncOptions};
use crate::error::{RecordError, RecordErrorClass};
use crate::kind::EntityKind;
use crate::ledger::{LedgerError, MappingLedger};
use crate::platform::{NewLink, SourceApi, SourceLink, TargetApi};

/// Value stored against every link signature.
pub const CREATED_MARKER: &str = "created";

const LINK_TYPES_SCOPE: &str = "link-types";

/// Run the links stage against `ledger`.
pub async fn sync_links<S, T>(
    source: &S,
    target: &T,
    work_items: &MappingLedger,
    ledger: &mut MappingLedger,
    options: &SyncOptions,
    on_event: Option<&EventCallback>,
) -> Result<StageReport, LedgerError>
where
    S: SourceApi + ?Sized,
    T: TargetApi + ?Sized,
{
    let mut run = StageRun::new(ledger, options, on_event);
    let mut stats = LinkStats::default();

    let resolver = match run
        .retrying(LINK_TYPES_SCOPE, || target.list_link_types())
        .await
    {
        Ok(types) => LinkTypeResolver::new(types),
        Err(e) => {
            run.record_error(RecordError::new(
                EntityKind::Links,
                LINK_TYPES_SCOPE,
                RecordErrorClass::Fetch,
                format!("could not enumerate target link types: {e}"),
            ));
            run.report_mut()
                .incomplete_scopes
                .push(LINK_TYPES_SCOPE.to_string());
            run.report_mut().links = Some(stats);
            return run.finish();
        }
    };

    let mut seen: HashSet<String> = run.ledger().mappings().keys().cloned().collect();
    let mut reconciler = Reconciler {
        target,
        work_items,
        resolver: &resolver,
        seen: &mut seen,
        stats: &mut stats,
    };

    for (source_key, item_id) in work_items.mappings() {
        if run.should_stop() {
            break;
        }
        if !options.admits(source_key) {
            continue;
        }

        let links = match run.retrying(source_key, || source.list_links(source_key)).await {
            Ok(links) => links,
            Err(e) => {
                run.report_mut()
                    .incomplete_scopes
                    .push(format!("links:{source_key}"));
                run.record_error(RecordError::new(
                    EntityKind::Links,
                    source_key.clone(),
                    RecordErrorClass::Fetch,
                    format!("could not list links: {e}"),
                ));
                continue;
            }
        };

        for link in &links {
            if run.should_stop() {
                break;
            }
            reconciler.reconcile(&mut run, source_key, item_id, link).await;
            run.tick()?;
        }
    }

    run.report_mut().links = Some(stats);
    run.finish()
}

struct Reconciler<'a, T: ?Sized> {
    target: &'a T,
    work_items: &'a MappingLedger,
    resolver: &'a LinkTypeResolver,
    seen: &'a mut HashSet<String>,
    stats: &'a mut LinkStats,
}

impl<T: TargetApi + ?Sized> Reconciler<'_, T> {
    async fn reconcile(
        &mut self,
        run: &mut StageRun<'_>,
        source_key: &str,
        item_id: &str,
        link: &SourceLink,
    ) {
        self.stats.found += 1;

        let Some(other_key) = link.other_key() else {
            self.stats.unresolved += 1;
            return;
        };
        let Some(other_id) = self.work_items.get(other_key) else {
            tracing::debug!(
                "Skipping link {} -> {}: {} has not been migrated",
                source_key,
                other_key,
                other_key
            );
            self.stats.unresolved += 1;
            return;
        };

        let rule = self.rule_for(run, link);
        let Some(link_type) = self.resolver.resolve(rule.category) else {
            run.record_error(RecordError::new(
                EntityKind::Links,
                format!("{source_key}->{other_key}"),
                RecordErrorClass::Permanent,
                format!("target defines neither {} nor Relates", rule.category),
            ));
            return;
        };

        let signature = LinkSignature::new(item_id, other_id, &link_type.name).to_string();
        if !self.seen.insert(signature.clone()) {
            self.stats.duplicates += 1;
            run.count_skip(&signature);
            return;
        }

        let (from_id, to_id) = match outward_end(&rule, link.is_inward()) {
            Direction::Outward => (item_id, other_id),
            Direction::Inward => (other_id, item_id),
        };
        let new_link = NewLink {
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            link_type_id: link_type.id.clone(),
            directed: link_type.directed,
        };

        match run
            .retrying(&signature, || self.target.create_link(&new_link))
            .await
        {
            Ok(()) => {
                run.record_mapping(&signature, CREATED_MARKER, true);
                *self.stats.by_type.entry(link_type.name.clone()).or_default() += 1;
            }
            Err(e) if e.is_conflict() => {
                run.record_mapping(&signature, CREATED_MARKER, false);
            }
            Err(e) => {
                self.seen.remove(&signature);
                run.record_error(RecordError::from_remote(
                    EntityKind::Links,
                    format!("{source_key}->{other_key}"),
                    &e,
                ));
            }
        }
    }

    fn rule_for(&mut self, run: &mut StageRun<'_>, link: &SourceLink) -> LinkRule {
        let Some(key) = link.type_key() else {
            return FALLBACK_RULE;
        };
        match lookup(&key) {
            Some(rule) => rule,
            None => {
                if self.stats.unknown_types.insert(key.clone()) {
                    run.warn(format!("Unknown link type '{key}' migrated as Relates"));
                }
                FALLBACK_RULE
            }
        }
    }
}
