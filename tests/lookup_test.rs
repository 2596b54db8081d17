mod common;

use common::sample_fleet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scooter_rent::application::lookup::ScooterLookup;
use scooter_rent::error::RentalError;

const ALPHABET: &[u8] = b"ABGDQZagz0129 -";

fn looks_like_frame(input: &str) -> bool {
    let code = input.trim().as_bytes();
    code.len() == 5
        && code[..2].iter().all(u8::is_ascii_uppercase)
        && code[2..].iter().all(u8::is_ascii_digit)
}

#[tokio::test]
async fn test_only_well_formed_codes_reach_backend() {
    let mut rng = StdRng::seed_from_u64(29);
    let fleet = sample_fleet();
    let lookup = ScooterLookup::new(fleet.clone());

    let mut expected_calls = 0;
    for _ in 0..2_000 {
        let len = rng.gen_range(0..=7);
        let input: String = (0..len)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect();

        let result = lookup.lookup(&input).await;
        if looks_like_frame(&input) {
            expected_calls += 1;
            assert!(
                !matches!(result, Err(RentalError::ValidationError(_))),
                "{input:?} should pass validation"
            );
        } else {
            assert_eq!(result, Err(RentalError::ValidationError(input.trim().to_string())));
        }
        assert_eq!(fleet.lookup_calls(), expected_calls);
    }
}

#[tokio::test]
async fn test_known_codes() {
    let fleet = sample_fleet();
    let lookup = ScooterLookup::new(fleet.clone());

    let scooter = lookup.lookup(" GD029 ").await.unwrap();
    assert_eq!(scooter.model, "Xiaomi M365");
    assert_eq!(
        lookup.lookup("QQ000").await,
        Err(RentalError::NotFoundError("QQ000".to_string()))
    );
    assert!(matches!(
        lookup.lookup("zz999").await,
        Err(RentalError::ValidationError(_))
    ));
    assert_eq!(fleet.lookup_calls(), 2);
}
