//! Runs in its own process: installs a configuration that switches the
//! dropped-payload tally off.

use carrier::{DiagnosticInfo, ErrorId, HandlerList, config::Config, new_error, try_handle_all};

struct Unwanted;

#[test]
fn test_installed_config_disables_tally() {
    Config::new().diagnostics(false).install().unwrap();
    assert!(!Config::current().diagnostics_enabled());

    let (dropped, tallying) = try_handle_all(
        || -> Result<_, ErrorId> { Err(new_error((Unwanted, Unwanted))) },
        HandlerList::new().otherwise(|info: DiagnosticInfo| {
            (info.dropped(), carrier::diagnostics::tally_enabled())
        }),
    );
    assert!(dropped.is_none());
    assert!(!tallying);
}
