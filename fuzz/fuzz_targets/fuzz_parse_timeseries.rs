#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary response bodies must never panic the parser or the reducer
    let Ok(response) = horae::telemetry::TimeseriesResponse::from_body(data) else {
        return;
    };

    for samples in response.0.values() {
        let (_, used) = horae::aggregate::sum_samples(samples);
        assert!(used <= samples.len());
    }
});
