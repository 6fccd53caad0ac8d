//! Django web application served by gunicorn behind nginx.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::command::{Engine, Params, escape_braces};
use crate::env_file::EnvFile;
use crate::repo::RepoSource;
use crate::transport::Transport;

use super::{
    Component, ComponentError, Database, RedisCache, Stage, gunicorn_unit, nginx_site, run_stages,
};

/// Jobs run in the project directory after every fresh deployment.
pub const DEFAULT_POST_DEPLOY_JOBS: [&str; 2] = [
    "python3 manage.py migrate",
    "python3 manage.py collectstatic --no-input",
];

/// Inputs for a new [`WebApp`].
#[derive(Clone, Debug)]
pub struct WebAppOptions {
    /// Instance name; also names the gunicorn unit and nginx site.
    pub name: String,
    /// Public domain name, may be empty.
    pub domain: String,
    /// Public address of the host.
    pub address: String,
    /// Unix account the application runs as.
    pub user: String,
    /// Password for `user`; generated when absent.
    pub password: Option<String>,
    /// Application source.
    pub repo: RepoSource,
    /// gunicorn entry point; defaults to `<name>.wsgi:application`.
    pub wsgi_module: Option<String>,
    /// Database the application connects to.
    pub database: Database,
    /// Cache the application connects to.
    pub cache: RedisCache,
    /// Extra environment variables overriding the defaults.
    pub env: EnvFile,
    /// Jobs run after deployment; [`DEFAULT_POST_DEPLOY_JOBS`] when empty.
    pub post_deploy: Vec<String>,
}

/// A deployed application with its service and site configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct WebApp {
    name: String,
    initialized: bool,
    domain: String,
    address: String,
    user: String,
    password: String,
    repo: RepoSource,
    wsgi_module: String,
    database: Database,
    cache: RedisCache,
    env: EnvFile,
    post_deploy: Vec<String>,
}

impl WebApp {
    /// Describes an application that has not been deployed yet.
    #[must_use]
    pub fn new(options: WebAppOptions) -> Self {
        let WebAppOptions {
            name,
            domain,
            address,
            user,
            password,
            repo,
            wsgi_module,
            database,
            cache,
            env: overrides,
            post_deploy,
        } = options;

        let mut env = EnvFile::with_defaults(&cache.url(), &database.url(), &domain, &address);
        env.merge(overrides);
        let post_deploy = if post_deploy.is_empty() {
            DEFAULT_POST_DEPLOY_JOBS.iter().map(|job| (*job).to_owned()).collect()
        } else {
            post_deploy
        };

        Self {
            wsgi_module: wsgi_module.unwrap_or_else(|| format!("{name}.wsgi:application")),
            password: password.unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            name,
            initialized: false,
            domain,
            address,
            user,
            repo,
            database,
            cache,
            env,
            post_deploy,
        }
    }

    /// Project checkout directory on the host.
    #[must_use]
    pub fn root(&self) -> String {
        format!("/home/{}/ROOT", self.user)
    }

    /// Unix account the application runs as.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Public domain name.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Public address of the host.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Environment written to the project's `.env`.
    #[must_use]
    pub const fn env(&self) -> &EnvFile {
        &self.env
    }

    /// Post-deployment jobs.
    #[must_use]
    pub fn post_deploy(&self) -> &[String] {
        &self.post_deploy
    }

    /// Database snapshot taken when the app was created.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.database
    }

    /// URL the app is reachable at.
    #[must_use]
    pub fn url(&self) -> String {
        let host = if self.domain.is_empty() {
            &self.address
        } else {
            &self.domain
        };
        format!("http://{host}/")
    }

    /// Template bindings for every stage.
    #[must_use]
    pub fn params(&self) -> Params {
        let mut params = Params::new()
            .with("app.name", self.name.as_str())
            .with("app.root", self.root())
            .with("user", self.user.as_str())
            .with("password", self.password.as_str())
            .with("domain", self.domain.as_str())
            .with("address", self.address.as_str());
        params.extend_from(&self.repo.params());
        params.extend_from(&self.database.params());
        params.extend_from(&self.cache.params());
        params
    }

    fn install_stages() -> Vec<Stage> {
        vec![
            Stage::serial(
                "system packages",
                [
                    "apt update && apt upgrade -y",
                    "apt install -y python3-pip python3-dev nginx curl certbot python3-certbot-nginx git",
                    "pip3 install gunicorn psycopg2",
                ],
            ),
            Stage::serial(
                "application user",
                [
                    "adduser {user} --gecos \"First Last,RoomNumber,WorkPhone,HomePhone\" --disabled-password",
                    "echo \"{user}:{password}\" | chpasswd",
                    "usermod -aG sudo {user}",
                    "cp -r .ssh /home/{user}/",
                    "chown -R {user}:{user} /home/{user}/.ssh",
                    "chmod 755 /home/{user}",
                ],
            ),
            Stage::serial(
                "project",
                [
                    "rm -rf {app.root}",
                    "git clone -b {github.branch} {github.url} {app.root}",
                    "chown -R {user}:{user} {app.root}",
                    "pip3 install -r {app.root}/requirements.txt",
                ],
            ),
        ]
    }

    fn release_stages(&self) -> Vec<Stage> {
        let jobs = self.post_deploy.iter().map(|job| {
            format!(
                "cd {{app.root}} && set -a && . ./.env && set +a && {}",
                escape_braces(job)
            )
        });
        vec![
            Stage::serial("post deploy", jobs),
            Stage::serial(
                "services",
                [
                    "systemctl daemon-reload",
                    "systemctl enable gunicorn-{app.name}",
                    "systemctl restart gunicorn-{app.name}",
                    "ln -sf /etc/nginx/sites-available/{app.name} /etc/nginx/sites-enabled/{app.name}",
                    "nginx -t",
                    "systemctl restart nginx",
                ],
            ),
        ]
    }

    fn write_config_files<T: Transport + ?Sized>(
        &self,
        engine: &Engine<'_, T>,
    ) -> Result<(), ComponentError> {
        let root = self.root();
        let channel = engine.transport().file_channel();
        channel.write(&format!("{root}/.env"), &self.env.render())?;
        channel.write(
            &format!("/etc/systemd/system/gunicorn-{}.service", self.name),
            &gunicorn_unit(&self.name, &self.user, &root, &self.wsgi_module),
        )?;
        channel.write(
            &format!("/etc/nginx/sites-available/{}", self.name),
            &nginx_site(&self.name, &root, &[&self.domain, &self.address]),
        )?;
        info!(app = %self.name, "configuration files written");
        Ok(())
    }
}

impl Component for WebApp {
    const TYPE_NAME: &'static str = "WebApp";

    fn name(&self) -> &str {
        &self.name
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    fn setup<T: Transport + ?Sized>(&mut self, engine: &Engine<'_, T>) -> Result<(), ComponentError> {
        let params = self.params();
        run_stages(engine, Self::install_stages(), &params)?;
        self.write_config_files(engine)?;
        run_stages(engine, self.release_stages(), &params)?;
        Ok(())
    }
}
