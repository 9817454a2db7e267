use crate::stream::{
    realtime_channel, MemorySink, MemorySource, OfflineDriver, StreamSink, StreamSource,
};
use crate::wav::{self, WavSink, WavSource};
use crate::{
    BlockConvolver, ChannelPipeline, DirectConvolver, FFTConvolver, ImpulseResponse, Sample,
    TwoStageConvolver, HEAD_BLOCK_SIZE, TAIL_BLOCK_SIZE,
};

pub fn generate_sinusoid(
    length: usize,
    frequency: f32,
    sample_rate: f32,
    gain: f32,
) -> Vec<Sample> {
    let mut signal = vec![0.0; length];
    for i in 0..length {
        signal[i] =
            gain * (2.0 * std::f32::consts::PI * frequency * i as Sample / sample_rate).sin();
    }
    signal
}

/// Deterministic white noise in [-gain, gain].
pub fn generate_noise(length: usize, seed: u32, gain: f32) -> Vec<Sample> {
    let mut state = seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    (0..length)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            gain * (state as f32 / u32::MAX as f32 * 2.0 - 1.0)
        })
        .collect()
}

/// Noise with an exponential decay, shaped like a room response.
fn generate_response(length: usize, seed: u32) -> Vec<Sample> {
    generate_noise(length, seed, 1.0)
        .into_iter()
        .enumerate()
        .map(|(i, x)| x * (-(i as f32) / 400.0).exp())
        .collect()
}

/// Linear convolution truncated to the input length.
fn direct_convolution(input: &[Sample], response: &[Sample]) -> Vec<Sample> {
    (0..input.len())
        .map(|n| {
            let taps = std::cmp::min(n + 1, response.len());
            (0..taps)
                .map(|k| input[n - k] as f64 * response[k] as f64)
                .sum::<f64>() as Sample
        })
        .collect()
}

/// Calls `process` with a repeating pattern of chunk lengths.
fn process_in_chunks<F>(input: &[Sample], output: &mut [Sample], pattern: &[usize], mut process: F)
where
    F: FnMut(&[Sample], &mut [Sample]),
{
    let mut pos = 0;
    for &chunk in pattern.iter().cycle() {
        if pos >= input.len() {
            break;
        }
        let end = std::cmp::min(pos + chunk, input.len());
        process(&input[pos..end], &mut output[pos..end]);
        pos = end;
    }
}

fn assert_close(lhs: &[Sample], rhs: &[Sample], tolerance: Sample) {
    assert_eq!(lhs.len(), rhs.len());
    for (i, (a, b)) in lhs.iter().zip(rhs).enumerate() {
        assert!(
            (a - b).abs() < tolerance,
            "sample {}: {} vs {} (tolerance {})",
            i,
            a,
            b,
            tolerance
        );
    }
}

const CHUNK_PATTERN: [usize; 8] = [1, 7, 64, 100, 513, 33, 512, 250];

#[test]
fn fft_convolver_matches_direct_convolution() {
    let response = generate_response(1500, 1);
    let input = generate_noise(6000, 2, 1.0);
    let expected = direct_convolution(&input, &response);

    for block_size in [1, 16, 64, 100, 512, 2048] {
        let mut convolver = FFTConvolver::new(&response, block_size).unwrap();
        let mut output = vec![0.0; input.len()];
        process_in_chunks(&input, &mut output, &CHUNK_PATTERN, |x, y| convolver.process(x, y));
        assert_close(&output, &expected, 1e-3);
    }
}

#[test]
fn direct_and_fft_convolvers_are_equivalent() {
    let response = generate_sinusoid(48, 1000.0, 48000.0, 1.0);
    let input = generate_sinusoid(4096, 1300.0, 48000.0, 1.0);
    let mut direct = DirectConvolver::new(&response, HEAD_BLOCK_SIZE).unwrap();
    let mut fft = FFTConvolver::new(&response, HEAD_BLOCK_SIZE).unwrap();
    let mut output_direct = vec![0.0; input.len()];
    let mut output_fft = vec![0.0; input.len()];

    process_in_chunks(&input, &mut output_direct, &[256], |x, y| direct.process(x, y));
    process_in_chunks(&input, &mut output_fft, &[256], |x, y| fft.process(x, y));
    assert_close(&output_direct, &output_fft, 1e-4);
}

#[test]
fn two_stage_equals_full_linear_convolution() {
    let input = generate_noise(5000, 3, 1.0);
    for ir_len in [1, 2, 63, 64, 65, 511, 512, 513, 1023, 1024, 1025, 1700, 3000] {
        let response = generate_response(ir_len, ir_len as u32);
        let expected = direct_convolution(&input, &response);

        let mut convolver =
            TwoStageConvolver::new(&response, HEAD_BLOCK_SIZE, TAIL_BLOCK_SIZE).unwrap();
        let mut output = vec![0.0; input.len()];
        process_in_chunks(&input, &mut output, &CHUNK_PATTERN, |x, y| convolver.process(x, y));
        assert_close(&output, &expected, 1e-3);
    }
}

#[test]
fn two_stage_output_does_not_depend_on_chunking() {
    let response = generate_response(2600, 4);
    let input = generate_sinusoid(8000, 440.0, 48000.0, 0.8);

    let mut whole = TwoStageConvolver::new(&response, HEAD_BLOCK_SIZE, TAIL_BLOCK_SIZE).unwrap();
    let mut output_whole = vec![0.0; input.len()];
    whole.process(&input, &mut output_whole);

    for pattern in [&[1][..], &[64], &[480], &[13, 1000, 3], &[512, 512, 511]] {
        let mut chunked =
            TwoStageConvolver::new(&response, HEAD_BLOCK_SIZE, TAIL_BLOCK_SIZE).unwrap();
        let mut output_chunked = vec![0.0; input.len()];
        process_in_chunks(&input, &mut output_chunked, pattern, |x, y| chunked.process(x, y));
        assert_close(&output_chunked, &output_whole, 1e-4);
    }
}

#[test]
fn zero_length_process_is_a_no_op() {
    let response = generate_response(700, 5);
    let input = generate_noise(900, 6, 1.0);

    let mut reference =
        TwoStageConvolver::new(&response, HEAD_BLOCK_SIZE, TAIL_BLOCK_SIZE).unwrap();
    let mut expected = vec![0.0; input.len()];
    reference.process(&input, &mut expected);

    let mut convolver =
        TwoStageConvolver::new(&response, HEAD_BLOCK_SIZE, TAIL_BLOCK_SIZE).unwrap();
    let mut output = vec![0.0; input.len()];
    convolver.process(&input[..300], &mut output[..300]);
    convolver.process(&[], &mut []);
    convolver.process(&input[300..], &mut output[300..]);
    assert_close(&output, &expected, 1e-5);
}

#[test]
fn silence_in_silence_out() {
    for (ir_len, pattern) in [(100, &[100][..]), (600, &[64, 7][..]), (2000, &[480][..])] {
        let response = generate_response(ir_len, ir_len as u32);
        let mut convolver =
            TwoStageConvolver::new(&response, HEAD_BLOCK_SIZE, TAIL_BLOCK_SIZE).unwrap();

        let zeros = vec![0.0; 3000];
        let mut output = vec![1.0; zeros.len()];
        convolver.process(&zeros, &mut output);
        assert!(output.iter().all(|&y| y == 0.0));

        let mut burst = generate_noise(800, 8, 1.0);
        burst[799] = 0.5;
        let mut burst_output = vec![0.0; burst.len()];
        convolver.process(&burst, &mut burst_output);
        assert!(burst_output.iter().any(|&y| y != 0.0));

        // the L-th zero frame ends the ring-down
        let mut ring_down = vec![1.0; ir_len];
        process_in_chunks(&vec![0.0; ir_len], &mut ring_down, pattern, |x, y| {
            convolver.process(x, y)
        });
        assert!(ring_down[..ir_len - 1].iter().any(|&y| y != 0.0));
        assert_eq!(ring_down[ir_len - 1], 0.0);

        let mut after = vec![1.0; 2048];
        process_in_chunks(&vec![0.0; after.len()], &mut after, pattern, |x, y| {
            convolver.process(x, y)
        });
        assert!(after.iter().all(|&y| y == 0.0), "residue after {} zero frames", ir_len);
    }
}

#[test]
fn silent_gap_within_one_call() {
    let ir_len = 1200;
    let response = generate_response(ir_len, 21);
    let mut input = generate_noise(700, 22, 1.0);
    input[699] = 0.5;
    input.extend(vec![0.0; 3 * ir_len]);
    input.extend(generate_noise(700, 23, 1.0));

    let mut convolver =
        TwoStageConvolver::new(&response, HEAD_BLOCK_SIZE, TAIL_BLOCK_SIZE).unwrap();
    let mut output = vec![0.0; input.len()];
    convolver.process(&input, &mut output);

    assert_close(&output, &direct_convolution(&input, &response), 1e-3);
    assert!(output[700 + ir_len - 1..700 + 3 * ir_len]
        .iter()
        .all(|&y| y == 0.0));
}

#[test]
fn unit_impulse_is_identity() {
    let ir = ImpulseResponse::mono(vec![1.0], 48_000).unwrap();
    let mut pipeline = ChannelPipeline::new(&ir, 1, 1, 256).unwrap();
    let input = generate_noise(1000, 9, 0.9);
    let mut output = vec![0.0; input.len()];
    process_in_chunks(&input, &mut output, &[37, 256, 1], |x, y| {
        pipeline.process(x, y);
    });
    assert_eq!(output, input);
}

#[test]
fn two_tap_average() {
    let ir = ImpulseResponse::mono(vec![0.5, 0.5], 48_000).unwrap();
    let mut pipeline = ChannelPipeline::new(&ir, 1, 1, 64).unwrap();
    let mut output = [0.0; 4];
    pipeline.process(&[1.0, 0.0, 0.0, 0.0], &mut output);
    assert_eq!(output, [0.5, 0.5, 0.0, 0.0]);
}

#[test]
fn head_larger_than_response_is_head_only() {
    let response = generate_response(100, 10);
    let convolver = TwoStageConvolver::new(&response, 128, 512).unwrap();
    assert!(!convolver.has_tail());

    let mut convolver = convolver;
    let input = generate_noise(1000, 11, 1.0);
    let mut output = vec![0.0; input.len()];
    process_in_chunks(&input, &mut output, &CHUNK_PATTERN, |x, y| convolver.process(x, y));
    assert_close(&output, &direct_convolution(&input, &response), 1e-4);
}

#[test]
fn stereo_impulse_fans_out_mono_input() {
    let left = generate_response(1300, 12);
    let right = generate_response(1300, 13);
    let ir = ImpulseResponse::from_planar(vec![left.clone(), right.clone()], 48_000).unwrap();
    let mut pipeline = ChannelPipeline::new(&ir, 1, 2, 512).unwrap();

    let input = generate_noise(3000, 14, 1.0);
    let mut output = vec![0.0; input.len() * 2];
    let mut pos = 0;
    for &chunk in [480usize, 17, 1024].iter().cycle() {
        if pos >= input.len() {
            break;
        }
        let end = std::cmp::min(pos + chunk, input.len());
        pipeline.process(&input[pos..end], &mut output[pos * 2..end * 2]);
        pos = end;
    }

    let out_left: Vec<Sample> = output.iter().step_by(2).copied().collect();
    let out_right: Vec<Sample> = output.iter().skip(1).step_by(2).copied().collect();
    assert_close(&out_left, &direct_convolution(&input, &left), 1e-3);
    assert_close(&out_right, &direct_convolution(&input, &right), 1e-3);
}

#[test]
fn stereo_input_with_stereo_impulse_keeps_channels_apart() {
    let left = generate_response(600, 15);
    let right = generate_response(600, 16);
    let ir = ImpulseResponse::from_planar(vec![left.clone(), right.clone()], 48_000).unwrap();
    let mut pipeline = ChannelPipeline::new(&ir, 2, 2, 128).unwrap();

    let in_left = generate_noise(2000, 17, 1.0);
    let in_right = generate_sinusoid(2000, 300.0, 48000.0, 1.0);
    let interleaved: Vec<Sample> = in_left
        .iter()
        .zip(&in_right)
        .flat_map(|(&l, &r)| [l, r])
        .collect();
    let mut output = vec![0.0; interleaved.len()];
    assert_eq!(pipeline.process(&interleaved, &mut output), 2000);

    let out_left: Vec<Sample> = output.iter().step_by(2).copied().collect();
    let out_right: Vec<Sample> = output.iter().skip(1).step_by(2).copied().collect();
    assert_close(&out_left, &direct_convolution(&in_left, &left), 1e-3);
    assert_close(&out_right, &direct_convolution(&in_right, &right), 1e-3);
}

#[test]
fn realtime_and_offline_paths_agree() {
    let response = generate_response(1800, 18);
    let ir = ImpulseResponse::mono(response, 48_000).unwrap();
    let input = generate_noise(2 * 6000, 19, 0.5);

    let mut offline_pipeline = ChannelPipeline::new(&ir, 2, 2, 1024).unwrap();
    let mut driver = OfflineDriver::with_chunk_frames(offline_pipeline.clone(), 1000).unwrap();
    let mut source = MemorySource::new(input.clone(), 2, 48_000);
    let mut sink = MemorySink::new(2);
    driver.run(&mut source, &mut sink).unwrap();

    let mut whole = vec![0.0; input.len()];
    offline_pipeline.process(&input, &mut whole);
    assert_close(&sink.samples, &whole, 1e-4);

    let realtime_pipeline = ChannelPipeline::new(&ir, 2, 2, 256).unwrap();
    let (mut feed, mut processor, stats) = realtime_channel(realtime_pipeline, 1024);
    let callback_frames = 480;
    let mut rendered = vec![0.0; input.len()];
    for (capture, playback) in input
        .chunks(callback_frames * 2)
        .zip(rendered.chunks_mut(callback_frames * 2))
    {
        feed.push(capture);
        processor.render(playback);
    }
    assert_eq!(stats.underrun_frames(), 0);
    assert_eq!(stats.overrun_frames(), 0);
    assert_close(&rendered, &whole, 1e-4);
}

#[test]
fn offline_wav_conversion_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let kernel_path = dir.path().join("kernel.wav");
    let input_path = dir.path().join("dry.wav");
    let output_path = dir.path().join("wet.wav");

    let response = generate_response(900, 20);
    let mut kernel_sink = WavSink::create(&kernel_path, 1, 44_100).unwrap();
    kernel_sink.write(&response).unwrap();
    kernel_sink.finish().unwrap();

    let input = generate_sinusoid(5000, 220.0, 44100.0, 0.5);
    let mut input_sink = WavSink::create(&input_path, 1, 44_100).unwrap();
    input_sink.write(&input).unwrap();
    input_sink.finish().unwrap();

    let kernel = wav::load_impulse_response(&kernel_path).unwrap();
    let mut source = WavSource::open(&input_path).unwrap();
    let pipeline = ChannelPipeline::new(&kernel, source.channels(), 1, 2048).unwrap();
    let mut sink = WavSink::create(&output_path, 1, source.sample_rate()).unwrap();
    let report = OfflineDriver::with_chunk_frames(pipeline, 2048)
        .unwrap()
        .run(&mut source, &mut sink)
        .unwrap();
    assert_eq!(report.frames, 5000);

    let mut result = WavSource::open(&output_path).unwrap();
    assert_eq!(result.sample_rate(), 44_100);
    let mut output = vec![0.0; 5000];
    assert_eq!(result.read(&mut output).unwrap(), 5000);
    assert_close(&output, &direct_convolution(&input, &response), 1e-3);
}
