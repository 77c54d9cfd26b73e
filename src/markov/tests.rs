use super::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

#[test]
fn test_ababab_counts() {
    let model = MarkovModel::build("ababab", 1).unwrap();

    assert_eq!(model.order(), 1);
    assert_eq!(model.kgram_frequency("a").unwrap(), 3);
    assert_eq!(model.kgram_frequency("b").unwrap(), 3);
    assert_eq!(model.transition_frequency("a", 'b').unwrap(), 3);
    assert_eq!(model.transition_frequency("b", 'a').unwrap(), 3);
    assert_eq!(model.transition_frequency("a", 'a').unwrap(), 0);
    assert_eq!(model.alphabet(), &['a', 'b']);
    assert_eq!(model.total_observations(), 6);
}

#[test]
fn test_cyclic_wrap_gives_last_window_a_successor() {
    // "abc" + "ab": windows ab->c, bc->a, ca->b
    let model = MarkovModel::build("abc", 2).unwrap();
    assert_eq!(model.transition_frequency("bc", 'a').unwrap(), 1);
    assert_eq!(model.transition_frequency("ca", 'b').unwrap(), 1);
    assert_eq!(model.distinct_kgrams(), 3);
}

#[test]
fn test_counts_are_consistent() {
    let texts = [
        "password 123456 iloveyou ",
        "qwerty qwerty dragon ",
        "zzzzzzzz",
        "héllo wörld ünïcode ",
    ];
    for text in texts {
        for k in 1..4 {
            let model = MarkovModel::build(text, k).unwrap();
            assert!(model.is_consistent(), "inconsistent for {:?} k={}", text, k);
            let sum: u64 = model.kgram_counts().values().sum();
            assert_eq!(sum, text.chars().count() as u64);
        }
    }
}

#[test]
fn test_parallel_build_matches_sequential() {
    let text = "monkey letmein shadow master 666666 qwertyuiop 123321 mustang ".repeat(20);
    let sequential = MarkovModel::build(&text, 2).unwrap();
    for shards in [2, 3, 7, 64] {
        let parallel = MarkovModel::build_parallel(&text, 2, shards).unwrap();
        assert_eq!(sequential, parallel, "shards={}", shards);
    }
}

#[test]
fn test_invalid_order() {
    assert!(matches!(
        MarkovModel::build("abc", 0),
        Err(RankError::InvalidOrder { order: 0, text_len: 3 })
    ));
    assert!(matches!(
        MarkovModel::build("abc", 3),
        Err(RankError::InvalidOrder { order: 3, .. })
    ));
    assert!(MarkovModel::build("", 1).is_err());
}

#[test]
fn test_wrong_gram_length_fails_loudly() {
    let model = MarkovModel::build("ababab", 2).unwrap();
    assert!(matches!(
        model.kgram_frequency("a"),
        Err(RankError::WrongGramLength { expected: 2, actual: 1 })
    ));
    assert!(model.transition_frequency("abc", 'a').is_err());
    assert!(model.sample_next("abc", &mut rng(1)).is_err());
}

#[test]
fn test_short_ngrams_score_zero() {
    let model = MarkovModel::build("ababab", 2).unwrap();
    assert_eq!(model.ngram_probability(""), 0.0);
    assert_eq!(model.ngram_probability("a"), 0.0);
    assert_eq!(model.ngram_probability("ab"), 0.0);
    assert!(model.ngram_probability("aba") > 0.0);
}

#[test]
fn test_chain_rule_probability() {
    let model = MarkovModel::build("ababab", 1).unwrap();
    // P(a) * P(b|a) * P(a|b) = 3/6 * 3/3 * 3/3
    assert_eq!(model.ngram_probability("aba"), 0.5);

    // Unseen transition a->a is substituted with epsilon
    let expected = 0.5 * (DEFAULT_EPSILON / 3.0);
    assert_eq!(model.ngram_probability("aa"), expected);
}

#[test]
fn test_unseen_prefix_scores_zero() {
    let model = MarkovModel::build("ababab", 1).unwrap();
    assert_eq!(model.ngram_probability("zab"), 0.0);
}

#[test]
fn test_custom_epsilon_applies() {
    let policy = SmoothingPolicy {
        epsilon: 0.5,
        unseen: UnseenGramPolicy::Fail,
    };
    let model = MarkovModel::build("ababab", 1).unwrap().with_policy(policy);
    assert_eq!(model.ngram_probability("aa"), 0.5 * (0.5 / 3.0));
}

#[test]
fn test_sample_next_follows_distribution() {
    let model = MarkovModel::build("ababab", 1).unwrap();
    let mut r = rng(7);
    for _ in 0..50 {
        assert_eq!(model.sample_next("a", &mut r).unwrap(), 'b');
        assert_eq!(model.sample_next("b", &mut r).unwrap(), 'a');
    }
}

#[test]
fn test_unseen_gram_policies() {
    let model = MarkovModel::build("ababab", 1).unwrap();

    let uniform = model.clone().with_policy(SmoothingPolicy {
        unseen: UnseenGramPolicy::Uniform,
        ..SmoothingPolicy::default()
    });
    let c = uniform.sample_next("z", &mut rng(3)).unwrap();
    assert!(model.alphabet().contains(&c));

    let failing = model.with_policy(SmoothingPolicy {
        unseen: UnseenGramPolicy::Fail,
        ..SmoothingPolicy::default()
    });
    assert!(matches!(
        failing.sample_next("z", &mut rng(3)),
        Err(RankError::UnseenGram { .. })
    ));
}

#[test]
fn test_generate_length_and_determinism() {
    let model = MarkovModel::build("ababab", 1).unwrap();
    assert_eq!(model.generate("a", 5, rng(0)).unwrap(), "babab");
    assert_eq!(model.generate("a", 0, rng(0)).unwrap(), "");

    let text = "the quick brown fox jumps over the lazy dog ".repeat(5);
    let model = MarkovModel::build(&text, 2).unwrap();
    let first = model.generate("th", 40, rng(42)).unwrap();
    let second = model.generate("th", 40, rng(42)).unwrap();
    assert_eq!(first.chars().count(), 40);
    assert_eq!(first, second);
}

#[test]
fn test_generator_clone_restarts() {
    let text = "correct horse battery staple ".repeat(4);
    let model = MarkovModel::build(&text, 2).unwrap();
    let generator = model.generator("co", 25, rng(9)).unwrap();
    let replay = generator.clone();

    let a: String = generator.map(|c| c.unwrap()).collect();
    let b: String = replay.map(|c| c.unwrap()).collect();
    assert_eq!(a, b);
}

#[test]
fn test_generator_stops_after_failure() {
    let model = MarkovModel::build("ababab", 1)
        .unwrap()
        .with_policy(SmoothingPolicy {
            unseen: UnseenGramPolicy::Fail,
            ..SmoothingPolicy::default()
        });
    let mut generator = model.generator("z", 3, rng(1)).unwrap();
    assert!(generator.next().unwrap().is_err());
    assert!(generator.next().is_none());
}
