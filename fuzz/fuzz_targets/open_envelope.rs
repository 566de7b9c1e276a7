#![no_main]

use bailiff_envelope::{Bailiff, Envelope, Identity, KeyPair, Recipient};
use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static IDENTITY: Lazy<Identity> = Lazy::new(|| {
    Identity::from_key_pair(KeyPair::generate_with_bits(1024).unwrap()).unwrap()
});

static SEALED: Lazy<Envelope> = Lazy::new(|| {
    let me = Recipient::from_pem(IDENTITY.public_pem()).unwrap();
    Bailiff::new().seal(b"fuzz seed document", &[me]).unwrap()
});

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // Either a whole envelope from the input, or the seed with one field replaced.
    let env = match data[0] % 4 {
        0 => match Envelope::from_json(&data[1..]) {
            Ok(env) => env,
            Err(_) => return,
        },
        1 => Envelope { ciphertext: data[1..].to_vec(), ..SEALED.clone() },
        2 => Envelope { nonce: data[1..].to_vec(), ..SEALED.clone() },
        _ => Envelope { auth_tag: data[1..].to_vec(), ..SEALED.clone() },
    };

    if let Ok(doc) = Bailiff::new().open(&env, &IDENTITY) {
        // A mutated seed field can never authenticate.
        if data[0] % 4 != 0 {
            assert_eq!(doc.plaintext.as_slice(), b"fuzz seed document");
        }
    }
});
