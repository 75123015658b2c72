//! The standard catalog and group lists.
//!
//! ```text
//! universal                fixpoint
//! ├─ nzmask                action      [analysis]
//! ├─ mainloop              sequence, repeat
//! │  ├─ oppool1            pool, repeat
//! │  │  ├─ foldconstants               [base]
//! │  │  ├─ propagatecopy               [base]
//! │  │  ├─ collapsecopy                [analysis]
//! │  │  ├─ identity                    [analysis]
//! │  │  ├─ absorb                      [analysis]
//! │  │  └─ doublenegate                [analysis]
//! │  ├─ nzmask-refresh     action      [analysis]
//! │  └─ deadcode           action      [deadcode]
//! └─ cleanup               pool, repeat [cleanup]
//!    └─ negatecompare                  [cleanup]
//! ```
//!
//! The standard group lists mirror those of a full decompiler, so they name
//! more tags than this catalog uses; unknown tags select nothing.

use std::sync::Arc;

use crate::{
    compiler::{
        catalog::{Catalog, CatalogBuilder},
        passes::{
            AbsorbRule, CollapseCopyRule, DeadCodeAction, DoubleNegateRule, FoldConstantsRule,
            IdentityRule, NegateCompareRule, NonzeroMaskAction, PropagateCopyRule,
        },
    },
    Result,
};

/// The six standard group lists, by pipeline name.
pub const STANDARD_GROUP_LISTS: &[(&str, &[&str])] = &[
    (
        "decompile",
        &[
            "base",
            "protorecovery",
            "protorecovery_a",
            "deindirect",
            "localrecovery",
            "deadcode",
            "typerecovery",
            "stackptrflow",
            "blockrecovery",
            "stackvars",
            "deadcontrolflow",
            "switchnorm",
            "cleanup",
            "splitcopy",
            "splitpointer",
            "merge",
            "dynamic",
            "casts",
            "analysis",
            "fixateglobals",
            "fixateproto",
            "constsequence",
            "segment",
            "returnsplit",
            "nodejoin",
            "doubleload",
            "doubleprecis",
            "unreachable",
            "subvar",
            "floatprecision",
            "conditionalexe",
        ],
    ),
    (
        "jumptable",
        &[
            "base",
            "noproto",
            "localrecovery",
            "deadcode",
            "stackptrflow",
            "stackvars",
            "analysis",
            "segment",
            "subvar",
            "normalizebranches",
            "conditionalexe",
        ],
    ),
    (
        "normalize",
        &[
            "base",
            "protorecovery",
            "protorecovery_b",
            "deindirect",
            "localrecovery",
            "deadcode",
            "stackptrflow",
            "normalanalysis",
            "stackvars",
            "deadcontrolflow",
            "analysis",
            "fixateproto",
            "nodejoin",
            "unreachable",
            "subvar",
            "floatprecision",
            "normalizebranches",
            "conditionalexe",
        ],
    ),
    (
        "paramid",
        &[
            "base",
            "protorecovery",
            "protorecovery_b",
            "deindirect",
            "localrecovery",
            "deadcode",
            "typerecovery",
            "stackptrflow",
            "siganalysis",
            "stackvars",
            "deadcontrolflow",
            "analysis",
            "fixateproto",
            "unreachable",
            "subvar",
            "floatprecision",
            "conditionalexe",
        ],
    ),
    ("register", &["base", "analysis", "subvar"]),
    ("firstpass", &["base"]),
];

/// Builds the standard universal catalog.
///
/// # Errors
///
/// Returns [`crate::Error::DuplicateUnit`] if two units share a name.
pub fn standard_catalog() -> Result<Catalog> {
    CatalogBuilder::new().root_fixpoint("universal", "", |universal| {
        universal.action(Arc::new(NonzeroMaskAction));
        universal.sequence("mainloop", "", true, |mainloop| {
            mainloop.pool("oppool1", "", true, |pool| {
                pool.rule(Arc::new(FoldConstantsRule))
                    .rule(Arc::new(PropagateCopyRule))
                    .rule(Arc::new(CollapseCopyRule))
                    .rule(Arc::new(IdentityRule))
                    .rule(Arc::new(AbsorbRule))
                    .rule(Arc::new(DoubleNegateRule));
            });
            mainloop
                .action_as("nzmask-refresh", Arc::new(NonzeroMaskAction))
                .action(Arc::new(DeadCodeAction));
        });
        universal.pool("cleanup", "cleanup", true, |pool| {
            pool.rule(Arc::new(NegateCompareRule));
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_builds() {
        let catalog = standard_catalog().unwrap();
        for name in [
            "universal",
            "nzmask",
            "mainloop",
            "oppool1",
            "nzmask-refresh",
            "deadcode",
            "cleanup",
            "negatecompare",
        ] {
            assert!(catalog.find(name).is_some(), "missing {name}");
        }
        assert_eq!(
            catalog.groups(),
            vec!["analysis", "base", "cleanup", "deadcode"]
        );
    }

    #[test]
    fn test_six_standard_lists() {
        let names: Vec<&str> = STANDARD_GROUP_LISTS.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec!["decompile", "jumptable", "normalize", "paramid", "register", "firstpass"]
        );
    }
}
