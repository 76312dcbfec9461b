mod common;
mod ledger;
mod routing;
mod sweeps;
