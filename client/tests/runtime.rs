use client::{Client, ClientErr, EvaluateOutput, FitOutput, Result};
use comms::{
    Config, Metrics, MsgReceiver, MsgSender, Parameters, Scalar,
    msg::{Command, Msg, Payload},
};
use tokio::io::{self, DuplexStream, ReadHalf, WriteHalf};

/// Trains by adding one to every parameter, fails to evaluate empty parameters.
struct AddOne {
    parameters: Parameters,
}

impl Client for AddOne {
    fn get_parameters(&mut self) -> Result<Parameters> {
        Ok(self.parameters.clone())
    }

    fn fit(&mut self, parameters: &Parameters, _config: &Config) -> Result<FitOutput> {
        let mut parameters = parameters.clone();
        parameters.values_mut().iter_mut().for_each(|v| *v += 1.0);
        self.parameters = parameters.clone();

        Ok(FitOutput {
            parameters,
            num_examples: 12,
            metrics: Metrics::new(),
        })
    }

    fn evaluate(&mut self, parameters: &Parameters, _config: &Config) -> Result<EvaluateOutput> {
        if parameters.is_empty() {
            return Err(ClientErr::InvalidConfig {
                var: "parameters",
                value: "empty".to_string(),
            });
        }

        Ok(EvaluateOutput {
            loss: parameters.values().iter().map(|v| *v as f64).sum(),
            num_examples: 3,
            metrics: Metrics::from([("accuracy".to_string(), Scalar::Float(0.5))]),
        })
    }
}

type Channel = (
    MsgReceiver<ReadHalf<DuplexStream>>,
    MsgSender<WriteHalf<DuplexStream>>,
);

fn channel_pair() -> (Channel, Channel) {
    let (a, b) = io::duplex(1 << 16);
    let (a_rx, a_tx) = io::split(a);
    let (b_rx, b_tx) = io::split(b);
    (comms::channel(a_rx, a_tx), comms::channel(b_rx, b_tx))
}

fn params(values: Vec<f32>) -> Parameters {
    Parameters::new(vec![vec![values.len()]], values).unwrap()
}

async fn expect_join(rx: &mut MsgReceiver<ReadHalf<DuplexStream>>, buf: &mut Vec<u32>) {
    let msg: Msg = rx.recv_into(buf).await.unwrap();
    assert!(matches!(msg, Msg::Control(Command::Join)), "got {}", msg.kind());
}

#[tokio::test]
async fn serves_a_whole_session() {
    let ((client_rx, client_tx), (mut rx, mut tx)) = channel_pair();
    let running = tokio::spawn(async move {
        let mut client = AddOne {
            parameters: params(vec![0.0, 0.0]),
        };
        client::run(&mut client, client_rx, client_tx).await
    });

    let mut buf: Vec<u32> = Vec::new();
    expect_join(&mut rx, &mut buf).await;

    // Initial parameters.
    tx.send(&Msg::Control(Command::GetParameters)).await.unwrap();
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    let Msg::Data(Payload::Params(view)) = msg else {
        panic!("expected params, got {}", msg.kind());
    };
    assert_eq!(view.values(), &[0.0f32, 0.0]);

    // One round of training.
    let fit = Command::Fit {
        round: 1,
        config: Config::from([("rnd".to_string(), Scalar::Int(1))]),
    };
    let global = params(vec![1.0, 2.0]);
    tx.send(&Msg::Control(fit)).await.unwrap();
    tx.send(&Msg::Data(Payload::Params(global.view())))
        .await
        .unwrap();

    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    let Msg::Data(Payload::Params(view)) = msg else {
        panic!("expected params, got {}", msg.kind());
    };
    assert_eq!(view.values(), &[2.0f32, 3.0]);

    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    let Msg::Control(Command::FitRes { num_examples, .. }) = msg else {
        panic!("expected fit results, got {}", msg.kind());
    };
    assert_eq!(num_examples, 12);

    // Evaluation.
    let evaluate = Command::Evaluate {
        round: 1,
        config: Config::new(),
    };
    tx.send(&Msg::Control(evaluate)).await.unwrap();
    tx.send(&Msg::Data(Payload::Params(global.view())))
        .await
        .unwrap();

    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    let Msg::Control(Command::EvaluateRes {
        loss,
        num_examples,
        metrics,
    }) = msg
    else {
        panic!("expected evaluate results, got {}", msg.kind());
    };
    assert_eq!(loss, 3.0);
    assert_eq!(num_examples, 3);
    assert_eq!(metrics["accuracy"], Scalar::Float(0.5));

    // Shutdown.
    tx.send(&Msg::Control(Command::Disconnect)).await.unwrap();
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert!(matches!(msg, Msg::Control(Command::Disconnect)));

    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn client_failures_are_reported_and_the_session_goes_on() {
    let ((client_rx, client_tx), (mut rx, mut tx)) = channel_pair();
    let running = tokio::spawn(async move {
        let mut client = AddOne {
            parameters: params(vec![1.0]),
        };
        client::run(&mut client, client_rx, client_tx).await
    });

    let mut buf: Vec<u32> = Vec::new();
    expect_join(&mut rx, &mut buf).await;

    let empty = Parameters::default();
    let evaluate = Command::Evaluate {
        round: 2,
        config: Config::new(),
    };
    tx.send(&Msg::Control(evaluate)).await.unwrap();
    tx.send(&Msg::Data(Payload::Params(empty.view())))
        .await
        .unwrap();

    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    let Msg::Err(detail) = msg else {
        panic!("expected an error, got {}", msg.kind());
    };
    assert!(detail.contains("parameters"));

    tx.send(&Msg::Control(Command::GetParameters)).await.unwrap();
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert!(matches!(msg, Msg::Data(Payload::Params(_))));

    drop((rx, tx));
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn protocol_violations_end_the_session() {
    let ((client_rx, client_tx), (mut rx, mut tx)) = channel_pair();
    let running = tokio::spawn(async move {
        let mut client = AddOne {
            parameters: params(vec![1.0]),
        };
        client::run(&mut client, client_rx, client_tx).await
    });

    let mut buf: Vec<u32> = Vec::new();
    expect_join(&mut rx, &mut buf).await;

    let res = Command::FitRes {
        num_examples: 1,
        metrics: Metrics::new(),
    };
    tx.send(&Msg::Control(res)).await.unwrap();

    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ClientErr::UnexpectedMessage {
            got: "control/fit_res",
            ..
        }
    ));
}

#[tokio::test]
async fn non_finite_losses_are_reported_as_errors() {
    let ((client_rx, client_tx), (mut rx, mut tx)) = channel_pair();
    let running = tokio::spawn(async move {
        let mut client = AddOne {
            parameters: params(vec![1.0]),
        };
        client::run(&mut client, client_rx, client_tx).await
    });

    let mut buf: Vec<u32> = Vec::new();
    expect_join(&mut rx, &mut buf).await;

    let diverged = params(vec![f32::NAN, 1.0]);
    let evaluate = Command::Evaluate {
        round: 3,
        config: Config::new(),
    };
    tx.send(&Msg::Control(evaluate)).await.unwrap();
    tx.send(&Msg::Data(Payload::Params(diverged.view())))
        .await
        .unwrap();

    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    let Msg::Err(detail) = msg else {
        panic!("expected an error, got {}", msg.kind());
    };
    assert!(detail.contains("loss is not finite"), "got {detail}");

    tx.send(&Msg::Control(Command::GetParameters)).await.unwrap();
    let msg: Msg = rx.recv_into(&mut buf).await.unwrap();
    assert!(matches!(msg, Msg::Data(Payload::Params(_))));

    drop((rx, tx));
    running.await.unwrap().unwrap();
}
