use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::models::domain::question::{VisibleOption, VisibleQuestion};

/// Deterministic question-order permutation for a fresh attempt. The plan
/// is persisted afterwards, so this runs once per attempt and never on
/// rehydration.
pub fn shuffle_question_ids(questions: &[VisibleQuestion], seed: i64) -> Vec<String> {
    let mut ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
    let mut rng = StdRng::seed_from_u64(seed as u64);
    ids.shuffle(&mut rng);
    ids
}

/// Deterministic per-question option permutation. The sub-seed mixes the
/// question's plan position into the attempt seed so each question gets its
/// own stable order; re-serving the same question reproduces it exactly.
pub fn shuffle_options(options: &[VisibleOption], seed: i64, position: usize) -> Vec<VisibleOption> {
    let mut shuffled = options.to_vec();
    let sub_seed = seed ^ (position as i64 + 1);
    let mut rng = StdRng::seed_from_u64(sub_seed as u64);
    shuffled.shuffle(&mut rng);
    shuffled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::question::QuestionKind;

    fn questions(n: usize) -> Vec<VisibleQuestion> {
        (0..n)
            .map(|i| VisibleQuestion {
                id: format!("q{}", i),
                kind: QuestionKind::Single,
                question_text: format!("question {}", i),
                image_url: None,
                options: vec![],
            })
            .collect()
    }

    fn options(n: usize) -> Vec<VisibleOption> {
        (0..n)
            .map(|i| VisibleOption {
                id: format!("o{}", i),
                option_text: format!("option {}", i),
                image_url: None,
            })
            .collect()
    }

    #[test]
    fn test_question_shuffle_is_deterministic() {
        let qs = questions(20);
        let a = shuffle_question_ids(&qs, 12345);
        let b = shuffle_question_ids(&qs, 12345);
        assert_eq!(a, b);
    }

    #[test]
    fn test_question_shuffle_is_a_permutation() {
        let qs = questions(20);
        let mut shuffled = shuffle_question_ids(&qs, 99);
        shuffled.sort();
        let mut original: Vec<String> = qs.iter().map(|q| q.id.clone()).collect();
        original.sort();
        assert_eq!(shuffled, original);
    }

    #[test]
    fn test_different_seeds_usually_differ() {
        let qs = questions(20);
        let a = shuffle_question_ids(&qs, 1);
        let b = shuffle_question_ids(&qs, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_option_shuffle_depends_on_position() {
        let opts = options(10);
        let at0 = shuffle_options(&opts, 77, 0);
        let at0_again = shuffle_options(&opts, 77, 0);
        let at1 = shuffle_options(&opts, 77, 1);
        assert_eq!(at0, at0_again);
        assert_ne!(at0, at1);
    }

    #[test]
    fn test_negative_seed_is_stable() {
        let opts = options(5);
        let a = shuffle_options(&opts, -42, 3);
        let b = shuffle_options(&opts, -42, 3);
        assert_eq!(a, b);
    }
}
