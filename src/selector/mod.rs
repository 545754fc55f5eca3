use crate::error::CatalogError;
use rand::Rng;
use tracing::debug;

/// Pick one element uniformly at random.
///
/// Callers handle "no matches" before getting here, so an empty slice is
/// reported as a precondition violation.
pub fn pick_random<'a, T, R>(records: &'a [T], rng: &mut R) -> Result<&'a T, CatalogError>
where
    R: Rng + ?Sized,
{
    if records.is_empty() {
        return Err(CatalogError::PreconditionViolation(
            "cannot pick a title from an empty list".to_string(),
        ));
    }

    let index = rng.gen_range(0..records.len());
    debug!("Chosen title #{} from a list of {} titles", index, records.len());
    Ok(&records[index])
}

/// [`pick_random`] with the thread-local generator.
pub fn pick<T>(records: &[T]) -> Result<&T, CatalogError> {
    pick_random(records, &mut rand::thread_rng())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TitleKind, TitleRecord};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn titles(n: usize) -> Vec<TitleRecord> {
        (0..n)
            .map(|i| TitleRecord {
                id: i.to_string(),
                name: format!("Title {}", i),
                poster_url: String::new(),
                synopsis: String::new(),
                rating: Some(6.0),
                kind: TitleKind::Movie,
                release_year: Some(2000),
                runtime_minutes: Some(90),
            })
            .collect()
    }

    #[test]
    fn test_empty_list_is_precondition_violation() {
        let empty: Vec<TitleRecord> = Vec::new();
        assert!(matches!(
            pick(&empty),
            Err(CatalogError::PreconditionViolation(_))
        ));
    }

    #[test]
    fn test_single_element_is_always_chosen() {
        let list = titles(1);
        for _ in 0..10 {
            assert_eq!(pick(&list).unwrap().id, "0");
        }
    }

    #[test]
    fn test_selection_is_uniform() {
        let list = titles(5);
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut counts = [0usize; 5];
        let draws = 50_000;

        for _ in 0..draws {
            let chosen = pick_random(&list, &mut rng).unwrap();
            counts[chosen.id.parse::<usize>().unwrap()] += 1;
        }

        for count in counts {
            let frequency = count as f64 / draws as f64;
            assert!(
                (frequency - 0.2).abs() < 0.02,
                "frequency {} too far from 1/5",
                frequency
            );
        }
    }
}
