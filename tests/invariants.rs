use rand::SeedableRng;
use rand::rngs::StdRng;

use spanpack::masking::noise_budget;
use spanpack::planner::encoded_lengths;
use spanpack::{
    InMemoryDocuments, SplitRatios, build_samples_mapping, build_training_sample,
    create_sentinel_ids, plan, random_spans_noise_mask,
};

const VOCAB: usize = 32_128;
const EOS: u32 = 1;

fn recipes() -> Vec<(f64, f64)> {
    vec![(0.15, 3.0), (0.3, 2.0), (0.5, 3.0), (0.1, 8.0), (0.05, 2.0)]
}

#[test]
fn masks_respect_budget_for_every_recipe_and_length() {
    let mut rng = StdRng::seed_from_u64(2024);
    for (density, mean) in recipes() {
        for length in (2..300).step_by(7) {
            let (noise, spans) = noise_budget(length, density, mean);
            if length - noise < spans {
                continue;
            }
            let mask = random_spans_noise_mask(length, density, mean, &mut rng).unwrap();
            assert_eq!(mask.len(), length);
            assert!((1..length).contains(&mask.noise_count()));
            assert_eq!(mask.noise_count(), noise);
            assert_eq!(mask.span_count(), spans);
            assert!(!mask.as_slice()[0], "masks open with a kept token");
        }
    }
}

#[test]
fn complementary_sentinel_maps_partition_positions() {
    let mut rng = StdRng::seed_from_u64(9);
    for length in [2, 5, 33, 568] {
        let mask = random_spans_noise_mask(length, 0.15, 3.0, &mut rng).unwrap();
        let input = create_sentinel_ids(&mask, VOCAB);
        let target = create_sentinel_ids(&mask.complement(), VOCAB);
        for (pos, masked) in mask.as_slice().iter().enumerate() {
            let (inside, outside) = if *masked {
                (input.as_slice()[pos], target.as_slice()[pos])
            } else {
                (target.as_slice()[pos], input.as_slice()[pos])
            };
            assert_ne!(inside, 0, "position {pos} must be fused or replaced");
            assert_eq!(outside, 0, "position {pos} must be kept on the other side");
        }
        assert_eq!(input.sentinel_count(), mask.span_count());
    }
}

#[test]
fn assembled_lengths_follow_the_plan() {
    let mut cases: Vec<(usize, f64, f64)> = recipes()
        .into_iter()
        .map(|(density, mean)| (128, density, mean))
        .collect();
    // Half-density lengths whose maximal raw length is odd and gets trimmed.
    cases.extend([(11, 0.5, 3.0), (19, 0.5, 3.0), (27, 0.5, 3.0)]);
    for (desired, density, mean) in cases {
        let length_plan = plan(desired, density, mean).unwrap();
        let (noise, spans) = noise_budget(length_plan.raw_len, density, mean);
        if length_plan.raw_len - noise < spans {
            continue;
        }
        let tokens: Vec<u32> = (100..100 + length_plan.raw_len as u32).collect();
        let mut rng = StdRng::seed_from_u64(77);
        for _ in 0..20 {
            let mask =
                random_spans_noise_mask(length_plan.raw_len, density, mean, &mut rng).unwrap();
            let sample = build_training_sample(&tokens, &mask, VOCAB, EOS);
            assert_eq!(sample.input().len(), length_plan.input_len, "desired={desired}");
            assert_eq!(sample.target().len(), length_plan.target_len, "desired={desired}");
            assert_eq!(
                sample.text.len(),
                2 * (mask.span_count() + 1) + length_plan.raw_len
            );
        }
    }
}

#[test]
fn planned_raw_length_is_maximal() {
    for desired in [16, 64, 512, 1024] {
        for (density, mean) in recipes() {
            let length_plan = plan(desired, density, mean).unwrap();
            assert!(length_plan.raw_len + 1 >= desired);
            assert!(length_plan.input_len <= desired);
            assert_eq!(
                (length_plan.input_len, length_plan.target_len),
                encoded_lengths(length_plan.raw_len, density, mean)
            );
            // One more token either overflows the input or, at half density,
            // is the odd token trimmed to keep the target no longer than the input.
            let (input, target) = encoded_lengths(length_plan.raw_len + 1, density, mean);
            assert!(input > desired || (density == 0.5 && target > input));
        }
    }
}

#[test]
fn packed_windows_are_full_and_contiguous() {
    let lengths: Vec<usize> = (0..200).map(|i| (i * 53) % 131).collect();
    let store = InMemoryDocuments::with_lengths(&lengths, 0);
    let total: u64 = lengths.iter().sum::<usize>() as u64;
    for window in [1, 2, 17, 130, 131, 500] {
        let (samples, stats) = build_samples_mapping(&store, 0..200, window).unwrap();
        assert_eq!(samples.len() as u64, total / window);
        assert_eq!(stats.dropped_tokens, total % window);

        let mut cursor = (0u64, 0u64);
        for sample in &samples {
            assert_eq!(sample.token_len(), window);
            for span in &sample.spans {
                assert!(!span.is_empty());
                let (doc, offset) = cursor;
                if span.doc_id == doc {
                    assert_eq!(span.start, offset);
                } else {
                    assert!(span.doc_id > doc);
                    assert_eq!(span.start, 0);
                    assert!(lengths[doc as usize] as u64 == offset || offset == 0);
                    for skipped in doc + 1..span.doc_id {
                        assert_eq!(lengths[skipped as usize], 0);
                    }
                }
                cursor = (span.doc_id, span.end);
            }
        }
    }
}

#[test]
fn split_ranges_cover_every_document() {
    for raw in ["949,50,1", "1,1,1", "98/2", "0,1,0", "7,2,1"] {
        let ratios = SplitRatios::parse(raw).unwrap();
        for total in [0u64, 1, 2, 3, 10, 999, 10_007] {
            let ranges = ratios.document_ranges(total).unwrap();
            assert_eq!(ranges[0].1.start, 0);
            assert_eq!(ranges[2].1.end, total);
            assert_eq!(ranges[0].1.end, ranges[1].1.start);
            assert_eq!(ranges[1].1.end, ranges[2].1.start);
        }
    }
}
