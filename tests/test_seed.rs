//! Tests for reproducible parameter seeding.

#[cfg(test)]
mod test_seed {
    use ketchup::seed::{Distribution, ParameterSeeder};
    use pretty_assertions::assert_eq;

    fn ids() -> Vec<String> {
        (0..20)
            .map(|i| format!("kf[R{}_{}]", i / 4, i % 4))
            .collect()
    }

    fn draw(seed: u64, distribution: Distribution) -> Vec<f64> {
        let ids = ids();
        let mut seeder = ParameterSeeder::new(seed).unwrap();
        seeder
            .draw(ids.iter().map(String::as_str), 5000.0, distribution)
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    #[test]
    fn test_same_seed_same_values() {
        for distribution in [Distribution::Uniform, Distribution::Log] {
            assert_eq!(draw(0, distribution), draw(0, distribution));
            assert_eq!(draw(123_456, distribution), draw(123_456, distribution));
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        assert_ne!(draw(0, Distribution::Uniform), draw(1, Distribution::Uniform));
        assert_ne!(draw(41, Distribution::Log), draw(42, Distribution::Log));
    }

    #[test]
    fn test_uniform_values_within_scale() {
        let values = draw(9, Distribution::Uniform);
        assert_eq!(values.len(), 20);
        assert!(values.iter().all(|v| (0.0..5000.0).contains(v)));
    }

    #[test]
    fn test_pairs_keep_input_order() {
        let ids = ids();
        let mut seeder = ParameterSeeder::new(5).unwrap();
        let pairs = seeder
            .draw(ids.iter().map(String::as_str), 10.0, Distribution::Uniform)
            .unwrap();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
        let expected: Vec<&str> = ids.iter().map(String::as_str).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_stream_continues_between_draws() {
        let mut seeder = ParameterSeeder::new(3).unwrap();
        let first = seeder.draw(["a", "b"], 1.0, Distribution::Uniform).unwrap();
        let second = seeder.draw(["a", "b"], 1.0, Distribution::Uniform).unwrap();
        assert_ne!(first, second);
        assert_eq!(seeder.seed(), 3);
    }

    #[test]
    fn test_distribution_names() {
        assert_eq!("LOG".parse::<Distribution>().unwrap(), Distribution::Log);
        assert!("normal".parse::<Distribution>().is_err());
    }
}
