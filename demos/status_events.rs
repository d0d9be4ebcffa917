use std::time::Duration;
use unsupervised_lab::*;

fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();
    let (sample_cnt, sample_dims) = (5000, 50);

    // Generate some random data
    let mut samples = vec![0.0f64;sample_cnt * sample_dims];
    samples.iter_mut().for_each(|v| *v = rand::random());
    let dataset = Dataset::new("random", Matrix::new(samples, sample_cnt, sample_dims).expect("valid shape"))
        .with_defaults(ModelKind::KMeans, Some(4));

    let config = SessionConfig::build()
        .seed(1337)
        .step_delay(Duration::from_millis(50))
        .build()
        .expect("valid configuration");
    let mut session = Session::new(config).expect("valid configuration");
    session.load_dataset(dataset).expect("no job is running");
    session.set_observer(|event| match event {
        SessionEvent::KMeansIteration { iteration, state } => println!("Iteration {} - Error: {:.2}", iteration, state.distsum),
        SessionEvent::ElbowPoint(point) => println!("k={} SSE={:.2}", point.k, point.sse),
        _ => {}
    });

    // Stop the run from another thread, the way an interactive host would
    let controller = session.controller().clone();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(400));
        controller.stop()
    });

    let outcome = session.run_selected().expect("no other job is running");
    println!("{:?}: {}", outcome, session.state().status_text);
    if let Some(result) = session.kmeans_result() {
        println!("Kept result after {} iterations, Error: {:.2}", result.iterations, result.distsum);
    }
    stopper.join().expect("stopper thread panicked");

    let outcome = session.compute_elbow().expect("no other job is running");
    println!("{:?}: {}", outcome, session.state().status_text);
}
