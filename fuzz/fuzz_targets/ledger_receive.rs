#![no_main]

use libfuzzer_sys::fuzz_target;
use strongbox_vault::{LedgerAggregator, Redemption};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let ledger = LedgerAggregator::new();
    let before = ledger.ecash_balance();
    match ledger.receive_token(s) {
        Redemption::Credited { amount, balance } => {
            assert_eq!(balance, before + amount);
            assert_eq!(ledger.ecash_balance(), balance);
        }
        _ => assert_eq!(ledger.ecash_balance(), before),
    }
});
