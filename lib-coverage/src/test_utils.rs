/// Helpers shared by the tests of this crate.
use std::result;
use std::sync::{Arc, Mutex};

use slog::{self, Drain, Logger};

/// Drain remembering level and message of every record.
struct CapturingDrain {
    records: Arc<Mutex<Vec<(slog::Level, String)>>>,
}

impl Drain for CapturingDrain {
    type Ok = ();
    type Err = slog::Never;

    fn log(
        &self,
        record: &slog::Record,
        _values: &slog::OwnedKVList,
    ) -> result::Result<Self::Ok, Self::Err> {
        if let Ok(mut records) = self.records.lock() {
            records.push((record.level(), format!("{}", record.msg())));
        }
        Ok(())
    }
}

/// Logger whose records end up in the returned vector.
pub fn capturing_logger() -> (Logger, Arc<Mutex<Vec<(slog::Level, String)>>>) {
    let records = Arc::new(Mutex::new(Vec::new()));
    let drain = CapturingDrain {
        records: records.clone(),
    };
    (Logger::root(drain, o!()), records)
}

/// Messages logged at warning level.
pub fn warnings(records: &Arc<Mutex<Vec<(slog::Level, String)>>>) -> Vec<String> {
    records
        .lock()
        .unwrap()
        .iter()
        .filter(|&&(level, _)| level == slog::Level::Warning)
        .map(|&(_, ref msg)| msg.clone())
        .collect()
}
