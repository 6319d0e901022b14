use comms::{
    MsgReceiver, MsgSender, Parameters,
    msg::{Command, Msg, Payload},
};
use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
};

use crate::{
    error::{Result, ServerErr},
    proxy::{ClientId, ClientProxy, EvaluateIns, EvaluateRes, FitIns, FitRes},
};

const REQUEST_QUEUE: usize = 8;

type Reply<T> = oneshot::Sender<Result<T>>;

/// A request for the task serving a client connection.
enum Request {
    GetParameters(Reply<Parameters>),
    Fit {
        round: u64,
        ins: FitIns,
        reply: Reply<FitRes>,
    },
    Evaluate {
        round: u64,
        ins: EvaluateIns,
        reply: Reply<EvaluateRes>,
    },
    Disconnect(Reply<()>),
}

/// The `ClientProxy` of a client connected over the network.
///
/// Requests are forwarded to the connection's own task, which exchanges them with the
/// client one at a time.
#[derive(Clone)]
pub struct RemoteClient {
    id: ClientId,
    requests: mpsc::Sender<Request>,
}

impl RemoteClient {
    async fn request<T, F>(&self, make: F) -> Result<T>
    where
        F: FnOnce(Reply<T>) -> Request,
    {
        let (reply, rx) = oneshot::channel();

        self.requests
            .send(make(reply))
            .await
            .map_err(|_| ServerErr::ClientGone(self.id))?;

        rx.await.map_err(|_| ServerErr::ClientGone(self.id))?
    }
}

impl ClientProxy for RemoteClient {
    fn id(&self) -> ClientId {
        self.id
    }

    async fn get_parameters(&self) -> Result<Parameters> {
        self.request(Request::GetParameters).await
    }

    async fn fit(&self, round: u64, ins: &FitIns) -> Result<FitRes> {
        let ins = ins.clone();
        self.request(|reply| Request::Fit { round, ins, reply }).await
    }

    async fn evaluate(&self, round: u64, ins: &EvaluateIns) -> Result<EvaluateRes> {
        let ins = ins.clone();
        self.request(|reply| Request::Evaluate { round, ins, reply })
            .await
    }

    async fn disconnect(&self) -> Result<()> {
        self.request(Request::Disconnect).await
    }
}

/// The server end of a client connection.
pub struct Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    id: ClientId,
    rx: MsgReceiver<R>,
    tx: MsgSender<W>,
    requests: mpsc::Receiver<Request>,
    buf: Vec<u32>,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new `Connection` for client `id` along with the proxy that drives it.
    ///
    /// # Arguments
    /// * `id` - The id assigned to the client.
    /// * `rx` - The receiving end of the communication.
    /// * `tx` - The sending end of the communication.
    ///
    /// # Returns
    /// The client's proxy and the connection to `serve`.
    pub fn new(id: ClientId, rx: MsgReceiver<R>, tx: MsgSender<W>) -> (RemoteClient, Self) {
        let (requests_tx, requests) = mpsc::channel(REQUEST_QUEUE);

        let proxy = RemoteClient {
            id,
            requests: requests_tx,
        };

        let connection = Self {
            id,
            rx,
            tx,
            requests,
            buf: Vec::new(),
        };

        (proxy, connection)
    }

    /// Serves the proxy's requests until every proxy is dropped, the client disconnects
    /// or the stream breaks.
    pub async fn serve(mut self) {
        while let Some(request) = self.requests.recv().await {
            let done = match request {
                Request::GetParameters(reply) => {
                    let res = self.get_parameters().await;
                    respond(self.id, reply, res)
                }
                Request::Fit { round, ins, reply } => {
                    let res = self.fit(round, &ins).await;
                    respond(self.id, reply, res)
                }
                Request::Evaluate { round, ins, reply } => {
                    let res = self.evaluate(round, &ins).await;
                    respond(self.id, reply, res)
                }
                Request::Disconnect(reply) => {
                    let res = self.disconnect().await;
                    respond(self.id, reply, res);
                    true
                }
            };

            if done {
                break;
            }
        }

        debug!(client = self.id; "connection closed");
    }

    async fn get_parameters(&mut self) -> Result<Parameters> {
        self.tx.send(&Msg::Control(Command::GetParameters)).await?;
        self.recv_params().await
    }

    async fn fit(&mut self, round: u64, ins: &FitIns) -> Result<FitRes> {
        let cmd = Command::Fit {
            round,
            config: ins.config.clone(),
        };

        self.tx.send(&Msg::Control(cmd)).await?;
        self.tx
            .send(&Msg::Data(Payload::Params(ins.parameters.view())))
            .await?;

        let parameters = self.recv_params().await?;

        match self.recv_command().await? {
            Command::FitRes {
                num_examples,
                metrics,
            } => Ok(FitRes {
                parameters,
                num_examples,
                metrics,
            }),
            cmd => Err(unexpected(self.id, &Msg::Control(cmd))),
        }
    }

    async fn evaluate(&mut self, round: u64, ins: &EvaluateIns) -> Result<EvaluateRes> {
        let cmd = Command::Evaluate {
            round,
            config: ins.config.clone(),
        };

        self.tx.send(&Msg::Control(cmd)).await?;
        self.tx
            .send(&Msg::Data(Payload::Params(ins.parameters.view())))
            .await?;

        match self.recv_command().await? {
            Command::EvaluateRes {
                loss,
                num_examples,
                metrics,
            } => Ok(EvaluateRes {
                loss,
                num_examples,
                metrics,
            }),
            cmd => Err(unexpected(self.id, &Msg::Control(cmd))),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.tx.send(&Msg::Control(Command::Disconnect)).await?;

        match self.recv_command().await? {
            Command::Disconnect => Ok(()),
            cmd => Err(unexpected(self.id, &Msg::Control(cmd))),
        }
    }

    async fn recv_params(&mut self) -> Result<Parameters> {
        let msg: Msg = self.rx.recv_into(&mut self.buf).await?;

        match msg {
            Msg::Data(Payload::Params(params)) => Ok(params.to_owned()),
            msg => Err(unexpected(self.id, &msg)),
        }
    }

    async fn recv_command(&mut self) -> Result<Command> {
        let msg: Msg = self.rx.recv_into(&mut self.buf).await?;

        match msg {
            Msg::Control(cmd) => Ok(cmd),
            msg => Err(unexpected(self.id, &msg)),
        }
    }
}

/// The error for receiving `msg` when something else was expected, a client reporting
/// its own failure is not a protocol violation.
fn unexpected(client: ClientId, msg: &Msg) -> ServerErr {
    match msg {
        Msg::Err(detail) => ServerErr::ClientFailed {
            client,
            detail: detail.to_string(),
        },
        msg => ServerErr::UnexpectedMessage {
            client,
            got: msg.kind(),
        },
    }
}

/// Hands `res` back to the proxy that asked for it.
///
/// # Returns
/// Whether the connection can no longer be used.
fn respond<T>(client: ClientId, reply: Reply<T>, res: Result<T>) -> bool {
    let broken = matches!(
        res,
        Err(ServerErr::Io(_) | ServerErr::UnexpectedMessage { .. })
    );

    if let Err(e) = &res {
        warn!(client = client; "request failed: {e}");
    }

    // The proxy may have given up on the request already.
    let _ = reply.send(res);
    broken
}
