use rand::prelude::*;
use unsupervised_lab::*;

fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
    let mut rnd = StdRng::seed_from_u64(7);

    // 28x28 "images": every class lights up its own horizontal band
    let (classes, per_class, dims) = (4, 250, 784);
    let mut samples = Vec::with_capacity(classes * per_class * dims);
    for class in 0..classes {
        for _ in 0..per_class {
            samples.extend((0..dims).map(|px| if px / (dims / classes) == class { rnd.gen_range(0.7..1.0) } else { rnd.gen_range(0.0..0.1) }));
        }
    }
    let data = Matrix::new(samples, classes * per_class, dims).expect("valid shape");

    let config = AutoencoderConfig { bottleneck: 8, epochs: 5, learning_rate: 0.005, ..Default::default() };
    let outcome = AutoencoderTrainer::new()
        .train(&data, &config, &mut rnd, |report| println!("Epoch {}/{} - loss: {:.5}", report.epoch, report.max_epochs, report.loss))
        .expect("training failed");

    if let Some(pair) = outcome.reconstruction {
        let error: f64 = pair.original.as_slice().iter().zip(pair.reconstructed.as_slice())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>() / pair.original.as_slice().len() as f64;
        println!("Reconstruction error on {} samples: {:.5}", pair.original.rows(), error);
    }
}
