use std::io;

use comms::{
    Metrics, MsgReceiver, MsgSender, Parameters, Scalar,
    msg::{Command, Msg, Payload},
};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    client::Client,
    error::{ClientErr, Result},
};

/// Joins the server and serves its requests with `client` until told to disconnect.
///
/// Requests the client fails to serve are answered with an error message, the
/// connection stays open.
///
/// # Arguments
/// * `client` - The client serving the requests.
/// * `rx` - The receiving end of the communication.
/// * `tx` - The sending end of the communication.
///
/// # Errors
/// If the connection breaks or the server doesn't follow the protocol.
pub async fn run<C, R, W>(
    client: &mut C,
    mut rx: MsgReceiver<R>,
    mut tx: MsgSender<W>,
) -> Result<()>
where
    C: Client + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tx.send(&Msg::Control(Command::Join)).await?;
    info!("joined the server");

    let mut buf: Vec<u32> = Vec::new();

    loop {
        let msg: Msg = match rx.recv_into(&mut buf).await {
            Ok(msg) => msg,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("server closed the connection");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let cmd = match msg {
            Msg::Control(cmd) => cmd,
            msg => return unexpected("a command", &msg),
        };

        match cmd {
            Command::GetParameters => {
                debug!("parameters requested");
                match client.get_parameters() {
                    Ok(params) => send_params(&mut tx, &params).await?,
                    Err(e) => send_err(&mut tx, e).await?,
                }
            }
            Command::Fit { round, config } => {
                let params = recv_params(&mut rx, &mut buf).await?;
                debug!(round = round; "fit requested");

                match client.fit(&params, &config).and_then(|out| {
                    check_metrics(&out.metrics)?;
                    Ok(out)
                }) {
                    Ok(out) => {
                        send_params(&mut tx, &out.parameters).await?;
                        let res = Command::FitRes {
                            num_examples: out.num_examples,
                            metrics: out.metrics,
                        };
                        tx.send(&Msg::Control(res)).await?;
                    }
                    Err(e) => send_err(&mut tx, e).await?,
                }
            }
            Command::Evaluate { round, config } => {
                let params = recv_params(&mut rx, &mut buf).await?;
                debug!(round = round; "evaluate requested");

                match client.evaluate(&params, &config).and_then(|out| {
                    check_finite("loss", out.loss)?;
                    check_metrics(&out.metrics)?;
                    Ok(out)
                }) {
                    Ok(out) => {
                        let res = Command::EvaluateRes {
                            loss: out.loss,
                            num_examples: out.num_examples,
                            metrics: out.metrics,
                        };
                        tx.send(&Msg::Control(res)).await?;
                    }
                    Err(e) => send_err(&mut tx, e).await?,
                }
            }
            Command::Disconnect => {
                tx.send(&Msg::Control(Command::Disconnect)).await?;
                info!("disconnect received from the server");
                return Ok(());
            }
            cmd => return unexpected("a request", &Msg::Control(cmd)),
        }
    }
}

async fn recv_params<R>(rx: &mut MsgReceiver<R>, buf: &mut Vec<u32>) -> Result<Parameters>
where
    R: AsyncRead + Unpin,
{
    let msg: Msg = rx.recv_into(buf).await?;

    match msg {
        Msg::Data(Payload::Params(params)) => Ok(params.to_owned()),
        msg => unexpected("parameters", &msg),
    }
}

async fn send_params<W>(tx: &mut MsgSender<W>, params: &Parameters) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let msg = Msg::Data(Payload::Params(params.view()));
    tx.send(&msg).await?;
    Ok(())
}

async fn send_err<W>(tx: &mut MsgSender<W>, err: ClientErr) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    warn!("failed to serve request: {err}");
    let msg = Msg::Err(err.to_string().into());
    tx.send(&msg).await?;
    Ok(())
}

/// JSON has no encoding for NaN or infinities, so they can't be reported.
fn check_finite(what: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        return Ok(());
    }

    Err(ClientErr::NonFinite {
        what: what.to_string(),
        value,
    })
}

fn check_metrics(metrics: &Metrics) -> Result<()> {
    metrics.iter().try_for_each(|(name, value)| match value {
        Scalar::Float(x) => check_finite(name, *x),
        _ => Ok(()),
    })
}

fn unexpected<T>(expected: &'static str, msg: &Msg) -> Result<T> {
    Err(ClientErr::UnexpectedMessage {
        expected,
        got: msg.kind(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_float_metrics_are_rejected() {
        let mut metrics = Metrics::from([
            ("accuracy".to_string(), Scalar::Float(0.75)),
            ("steps".to_string(), Scalar::Int(10)),
        ]);
        assert!(check_metrics(&metrics).is_ok());

        metrics.insert("loss".to_string(), Scalar::Float(f64::INFINITY));
        let err = check_metrics(&metrics).unwrap_err();
        assert!(matches!(err, ClientErr::NonFinite { ref what, .. } if what == "loss"));
    }
}
