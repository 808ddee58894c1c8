//! Order-independent structural comparers used by every distinct gate.
//!
//! The dashboard API makes no ordering promise, so collections are sorted by
//! their key before being compared element-wise.

use crate::model::{Application, Replica, Service};
use std::cmp::Ordering;

pub fn unordered_eq<'a, T: 'a>(
    x: impl IntoIterator<Item = &'a T>,
    y: impl IntoIterator<Item = &'a T>,
    order: impl Fn(&T, &T) -> Ordering,
    eq: impl Fn(&T, &T) -> bool,
) -> bool {
    let mut x: Vec<&T> = x.into_iter().collect();
    let mut y: Vec<&T> = y.into_iter().collect();

    if x.len() != y.len() {
        return false;
    }

    x.sort_by(|a, b| order(a, b));
    y.sort_by(|a, b| order(a, b));

    x.iter().zip(y.iter()).all(|(a, b)| eq(a, b))
}

pub fn replicas_equal(x: &Replica, y: &Replica) -> bool {
    x.name == y.name && x.pid == y.pid
}

pub fn services_equal(x: &Service, y: &Service) -> bool {
    x.name == y.name
        && x.service_type == y.service_type
        && unordered_eq(
            x.replicas.values(),
            y.replicas.values(),
            |a, b| a.name.cmp(&b.name),
            replicas_equal,
        )
}

pub fn applications_equal(x: &Application, y: &Application) -> bool {
    x.id == y.id
        && x.name == y.name
        && x.dashboard == y.dashboard
        && x.pid == y.pid
        && unordered_eq(
            x.services.values(),
            y.services.values(),
            |a, b| a.name.cmp(&b.name),
            services_equal,
        )
}

pub fn application_lists_equal(x: &[Application], y: &[Application]) -> bool {
    unordered_eq(
        x,
        y,
        |a, b| a.id.cmp(&b.id).then_with(|| a.dashboard.cmp(&b.dashboard)),
        applications_equal,
    )
}
