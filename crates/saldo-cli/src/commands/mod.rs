pub(crate) mod auth;
pub(crate) mod ledger;
pub(crate) mod planning;
pub(crate) mod sync;
pub(crate) mod workspace;
