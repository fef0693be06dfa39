use anyhow::{Context, anyhow};
use clap::Parser;
use log::{error, info};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, sleep};

use crate::cli::{SubCommandExtend, open_recognizer};
use crate::config::{MatchOptions, Opts, OrbOptions};
use crate::server;

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub orb: OrbOptions,
    #[command(flatten)]
    pub matching: MatchOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let recognizer = open_recognizer(opts, &self.orb, &self.matching).await?;

        // 创建应用状态
        let state = server::AppState::new(recognizer);

        // 创建应用
        let app = server::create_app(state);

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
            let auth = match &self.prometheus_auth {
                Some(s) => {
                    let (username, password) =
                        s.split_once(':').ok_or_else(|| anyhow!("无效的认证信息: {}", s))?;
                    Some((username.to_string(), password.to_string()))
                }
                None => None,
            };
            tokio::spawn(push_metrics(url, instance, auth));
        }

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("无法监听 {}", self.addr))?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// 每 30 秒向 pushgateway 推送一次指标
async fn push_metrics(url: String, instance: String, auth: Option<(String, String)>) {
    loop {
        let metric_families = prometheus::gather();
        let url = url.clone();
        let instance = instance.clone();
        let auth = auth.clone();
        let r = spawn_blocking(move || {
            prometheus::push_metrics(
                "prodmatch",
                labels! {
                    "instance".to_string() => instance,
                },
                &url,
                metric_families,
                auth.map(|(username, password)| BasicAuthentication { username, password }),
            )
        })
        .await;
        match r {
            Ok(Err(e)) => error!("推送指标失败: {e}"),
            Err(e) => error!("推送指标的任务异常退出: {e}"),
            Ok(Ok(())) => {}
        }
        sleep(Duration::from_secs(30)).await;
    }
}
