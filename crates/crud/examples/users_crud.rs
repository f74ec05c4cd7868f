//! An in-memory user store served over HTTP.
//!
//! ```text
//! curl -v -H 'Content-Type: application/json' -d '{"name":"alice","zip":"10001"}' http://127.0.0.1:8080/api/users
//! curl -v http://127.0.0.1:8080/api/users/1
//! curl -v http://127.0.0.1:8080/api/users.csv
//! curl -v -X DELETE http://127.0.0.1:8080/api/users/1
//! ```

use async_trait::async_trait;
use http::StatusCode;
use micro_crud::csv::{Csv, CsvWriter};
use micro_crud::reader::RequestReader;
use micro_crud::router::{delete, get, post};
use micro_crud::scalar::Int64;
use micro_crud::writer::ResponseWriter;
use micro_crud::{Action, BoxError, Flow, Handler, Json, RequestContext, ResponseSink, Router, Server, Step, init_fn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    #[serde(default)]
    id: i64,
    name: String,
    zip: String,
}

static USERS: Lazy<Mutex<BTreeMap<i64, User>>> = Lazy::new(Mutex::default);

#[derive(Default)]
struct CreateUser {
    reader: RequestReader<(), (), (), Json<User>>,
    writer: ResponseWriter<(), Json<User>>,
}

#[async_trait]
impl Action for CreateUser {
    async fn validate(&mut self) -> Step {
        match self.reader.body.as_ref().and_then(Json::value) {
            Some(user) if !user.name.is_empty() => Ok(Flow::Continue),
            _ => Err("name must not be empty".into()),
        }
    }

    async fn execute(&mut self) -> Step {
        let mut user = self.reader.body.take().and_then(Json::into_inner).ok_or("missing user")?;
        let mut users = USERS.lock().map_err(|e| e.to_string())?;
        user.id = users.keys().next_back().map_or(1, |id| id + 1);
        users.insert(user.id, user.clone());

        self.writer = ResponseWriter::new().with_body(Json::new(user)).with_status(StatusCode::CREATED);
        Ok(Flow::Continue)
    }
}

#[async_trait]
impl Handler for CreateUser {
    async fn read_request(&mut self, req: &RequestContext) -> Result<(), BoxError> {
        self.reader.read_request(req).await
    }

    async fn write_response(&mut self, sink: &ResponseSink, req: &RequestContext) -> Result<(), BoxError> {
        self.writer.write_response(sink, req).await
    }
}

#[derive(Default)]
struct GetUser {
    reader: RequestReader<(), (), Int64>,
    writer: ResponseWriter<(), Json<User>>,
}

#[async_trait]
impl Action for GetUser {
    async fn execute(&mut self) -> Step {
        let id = self.reader.path.as_ref().map_or(0, |path| path.value("id"));
        let user = USERS.lock().map_err(|e| e.to_string())?.get(&id).cloned();

        self.writer = match user {
            Some(user) => ResponseWriter::new().with_body(Json::new(user)),
            None => ResponseWriter::default().with_status(StatusCode::NOT_FOUND),
        };
        Ok(Flow::Continue)
    }
}

#[async_trait]
impl Handler for GetUser {
    async fn read_request(&mut self, req: &RequestContext) -> Result<(), BoxError> {
        self.reader.read_request(req).await
    }

    async fn write_response(&mut self, sink: &ResponseSink, req: &RequestContext) -> Result<(), BoxError> {
        self.writer.write_response(sink, req).await
    }
}

fn get_user() -> GetUser {
    GetUser { reader: RequestReader::new().with_path(Int64::keys(["id"])), ..GetUser::default() }
}

struct DeleteUser {
    reader: RequestReader<(), (), Int64>,
    writer: ResponseWriter,
}

#[async_trait]
impl Action for DeleteUser {
    async fn execute(&mut self) -> Step {
        let id = self.reader.path.as_ref().map_or(0, |path| path.value("id"));
        let removed = USERS.lock().map_err(|e| e.to_string())?.remove(&id);
        self.writer.status = Some(if removed.is_some() { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND });
        Ok(Flow::Continue)
    }
}

#[async_trait]
impl Handler for DeleteUser {
    async fn read_request(&mut self, req: &RequestContext) -> Result<(), BoxError> {
        self.reader.read_request(req).await
    }

    async fn write_response(&mut self, sink: &ResponseSink, req: &RequestContext) -> Result<(), BoxError> {
        self.writer.write_response(sink, req).await
    }
}

fn delete_user() -> DeleteUser {
    DeleteUser { reader: RequestReader::new().with_path(Int64::keys(["id"])), writer: ResponseWriter::new() }
}

struct ExportUsers {
    rows: CsvWriter,
    writer: ResponseWriter<(), Csv<CsvWriter>>,
}

#[async_trait]
impl Action for ExportUsers {
    async fn execute(&mut self) -> Step {
        let users: Vec<User> = USERS.lock().map_err(|e| e.to_string())?.values().cloned().collect();
        for user in users {
            self.rows.write_row([user.id.to_string(), user.name, user.zip])?;
        }
        Ok(Flow::Continue)
    }
}

#[async_trait]
impl Handler for ExportUsers {
    fn init_response(&mut self, sink: &ResponseSink) -> Result<(), BoxError> {
        self.writer.init_response(sink)
    }

    async fn write_response(&mut self, sink: &ResponseSink, req: &RequestContext) -> Result<(), BoxError> {
        self.writer.write_response(sink, req).await
    }
}

fn export_users() -> ExportUsers {
    let rows = CsvWriter::new(["id", "name", "zip"], "users.csv");
    ExportUsers { writer: ResponseWriter::new().with_body(Csv(rows.clone())), rows }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let router = Router::builder()
        .path_prefix("/api")
        .route(post("/users", init_fn(CreateUser::default)))
        .route(get("/users.csv", init_fn(export_users)))
        .route(get("/users/{id}", init_fn(get_user)))
        .route(delete("/users/{id}", init_fn(delete_user)))
        .build()?;

    Server::builder().router(router).address("127.0.0.1:8080").build()?.start().await?;
    Ok(())
}
