#![no_main]

//! Fuzz target for type-name patterns
//!
//! Compiles arbitrary wildcard and regex patterns and matches them against
//! arbitrary names. Invalid patterns must fail with an error, never panic.

use arbitrary::Arbitrary;
use autodi::weave::Matcher;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct PatternInput {
    pattern: String,
    replacement: Option<String>,
    names: Vec<String>,
}

fuzz_target!(|input: PatternInput| {
    // Keep compile times bounded
    if input.pattern.len() > 256 {
        return;
    }

    let compiled = match &input.replacement {
        Some(replacement) => Matcher::new(&input.pattern, replacement),
        None => Matcher::literal(&input.pattern),
    };
    let Ok(matcher) = compiled else {
        return;
    };

    for name in input.names.iter().take(16) {
        let result = matcher.try_match(name);

        // A hit is always a hit for is_match
        if result.matched {
            assert!(matcher.is_match(name));
        }

        // Only matched templates produce a name
        if result.replacement.is_some() {
            assert!(result.matched);
            assert!(input.replacement.is_some());
        }
    }
});
