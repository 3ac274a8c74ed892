// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(signature) = apple_cdhash::EmbeddedSignature::from_bytes(data) {
        let _ = signature.code_directories();
    }
    let _ = apple_cdhash::cdhash_from_blob(data);
});
