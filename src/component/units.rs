//! Service and web server configuration files for a deployed app.

/// Renders the systemd unit running gunicorn for `app`.
#[must_use]
pub fn gunicorn_unit(app: &str, user: &str, root: &str, wsgi_module: &str) -> String {
    format!(
        "[Unit]
Description=gunicorn daemon for {app}
After=network.target

[Service]
User={user}
Group=www-data
WorkingDirectory={root}
EnvironmentFile={root}/.env
ExecStart=/usr/local/bin/gunicorn --access-logfile - --workers 3 --bind unix:/run/gunicorn-{app}.sock {wsgi_module}

[Install]
WantedBy=multi-user.target
"
    )
}

/// Renders the nginx site proxying `server_names` to the gunicorn socket.
#[must_use]
pub fn nginx_site(app: &str, root: &str, server_names: &[&str]) -> String {
    let names = server_names
        .iter()
        .filter(|name| !name.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "server {{
    listen 80;
    server_name {names};

    location = /favicon.ico {{ access_log off; log_not_found off; }}
    location /static/ {{
        root {root};
    }}

    location / {{
        include proxy_params;
        proxy_pass http://unix:/run/gunicorn-{app}.sock;
    }}
}}
"
    )
}
