// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! The scheduler registry seen from configuration: which types exist,
//! which are started by default, and what instance name a `(type, args)`
//! pair registers under. The decision loops themselves live outside this
//! crate; removing a scheduler by name only needs the name derivation,
//! not a constructed scheduler.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::errors::{Error, Result};

/// Schedulers started on a fresh cluster. Removing one of these leaves a
/// disabled tombstone in the config so the removal survives restarts.
const DEFAULT_SCHEDULER_TYPES: [&str; 4] =
    ["balance-region", "balance-leader", "hot-region", "label"];

pub fn is_default_scheduler(tp: &str) -> bool {
    DEFAULT_SCHEDULER_TYPES.contains(&tp)
}

/// Derives the instance name a scheduler of type `tp` with `args`
/// registers under. Types taking a store id carry it in the name so
/// several instances can coexist.
pub fn scheduler_name(tp: &str, args: &[String]) -> Result<String> {
    match tp {
        "balance-leader" => Ok("balance-leader-scheduler".to_owned()),
        "balance-region" => Ok("balance-region-scheduler".to_owned()),
        "hot-region" => Ok("balance-hot-region-scheduler".to_owned()),
        "label" => Ok("label-scheduler".to_owned()),
        "shuffle-leader" => Ok("shuffle-leader-scheduler".to_owned()),
        "shuffle-region" => Ok("shuffle-region-scheduler".to_owned()),
        "adjacent-region" => Ok("balance-adjacent-region-scheduler".to_owned()),
        "random-merge" => Ok("random-merge-scheduler".to_owned()),
        "evict-leader" => Ok(format!("evict-leader-scheduler-{}", first_arg(tp, args)?)),
        "grant-leader" => Ok(format!("grant-leader-scheduler-{}", first_arg(tp, args)?)),
        "scatter-range" => Ok(format!("scatter-range-{}", last_arg(tp, args)?)),
        _ => Err(Error::UnknownSchedulerType(tp.to_owned())),
    }
}

fn first_arg<'a>(tp: &str, args: &'a [String]) -> Result<&'a str> {
    args.first()
        .map(String::as_str)
        .ok_or_else(|| Error::SchedulerArgs(tp.to_owned()))
}

fn last_arg<'a>(tp: &str, args: &'a [String]) -> Result<&'a str> {
    args.last()
        .map(String::as_str)
        .ok_or_else(|| Error::SchedulerArgs(tp.to_owned()))
}

bitflags! {
    /// Flags characterizing an operator: what it moves and on whose
    /// behalf it was created.
    pub struct OperatorKind: u32 {
        /// Includes a leader transfer.
        const LEADER     = 1;
        /// Includes peer movement.
        const REGION     = 1 << 1;
        /// Initiated by an admin request.
        const ADMIN      = 1 << 2;
        /// Created by the hot region scheduler.
        const HOT_REGION = 1 << 3;
        /// Created by the adjacent region scheduler.
        const ADJACENT   = 1 << 4;
        /// Created by the replica checkers.
        const REPLICA    = 1 << 5;
        /// Created by the balancers.
        const BALANCE    = 1 << 6;
        /// Created by the merge checkers.
        const MERGE      = 1 << 7;
        /// Created by a range scheduler.
        const RANGE      = 1 << 8;
    }
}

const OPERATOR_KIND_NAMES: [(OperatorKind, &str); 9] = [
    (OperatorKind::LEADER, "leader"),
    (OperatorKind::REGION, "region"),
    (OperatorKind::ADMIN, "admin"),
    (OperatorKind::HOT_REGION, "hot-region"),
    (OperatorKind::ADJACENT, "adjacent"),
    (OperatorKind::REPLICA, "replica"),
    (OperatorKind::BALANCE, "balance"),
    (OperatorKind::MERGE, "merge"),
    (OperatorKind::RANGE, "range"),
];

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in OPERATOR_KIND_NAMES {
            if !self.contains(flag) {
                continue;
            }
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", name)?;
            first = false;
        }
        if first {
            write!(f, "unknown")?;
        }
        Ok(())
    }
}

impl FromStr for OperatorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<OperatorKind> {
        let mut kind = OperatorKind::empty();
        for token in s.split(',') {
            match OPERATOR_KIND_NAMES.iter().find(|(_, name)| *name == token) {
                Some((flag, _)) => kind |= *flag,
                None => return Err(Error::ParseOperatorKind(token.to_owned())),
            }
        }
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_name() {
        assert_eq!(
            scheduler_name("balance-leader", &[]).unwrap(),
            "balance-leader-scheduler"
        );
        assert_eq!(
            scheduler_name("hot-region", &[]).unwrap(),
            "balance-hot-region-scheduler"
        );
        assert_eq!(
            scheduler_name("evict-leader", &["2".to_owned()]).unwrap(),
            "evict-leader-scheduler-2"
        );
        assert_eq!(
            scheduler_name("scatter-range", &["a".to_owned(), "b".to_owned(), "test".to_owned()])
                .unwrap(),
            "scatter-range-test"
        );
        assert!(matches!(
            scheduler_name("evict-leader", &[]),
            Err(Error::SchedulerArgs(_))
        ));
        assert!(matches!(
            scheduler_name("foobar", &[]),
            Err(Error::UnknownSchedulerType(_))
        ));
    }

    #[test]
    fn test_default_schedulers() {
        for tp in ["balance-region", "balance-leader", "hot-region", "label"] {
            assert!(is_default_scheduler(tp));
        }
        assert!(!is_default_scheduler("evict-leader"));
        assert!(!is_default_scheduler("foobar"));
    }

    #[test]
    fn test_operator_kind() {
        assert_eq!(
            (OperatorKind::LEADER | OperatorKind::REPLICA).to_string(),
            "leader,replica"
        );
        assert_eq!(OperatorKind::empty().to_string(), "unknown");
        let kind: OperatorKind = "balance,region,leader".parse().unwrap();
        assert_eq!(
            kind,
            OperatorKind::BALANCE | OperatorKind::REGION | OperatorKind::LEADER
        );
        assert!("leader,region".parse::<OperatorKind>().is_ok());
        assert!(matches!(
            "foobar".parse::<OperatorKind>(),
            Err(Error::ParseOperatorKind(_))
        ));
    }
}
