//! OpenAPI description of the service, served in development only.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn openapi(State(state): State<AppState>) -> Json<Value> {
    Json(document(state.auth.as_ref().map(|validator| validator.issuer())))
}

/// Build the OpenAPI 3 document; the bearer scheme names the issuer when known.
pub fn document(issuer: Option<&str>) -> Value {
    let bearer_description = match issuer {
        Some(issuer) => format!("JWT access token issued by {}", issuer),
        None => "JWT access token (identity provider not configured)".to_string(),
    };

    json!({
        "openapi": "3.0.1",
        "info": {
            "title": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": {
            "/healthz": {
                "get": {
                    "operationId": "Healthz",
                    "responses": {
                        "200": {
                            "description": "Service is alive",
                            "content": { "text/plain": { "schema": { "type": "string" } } }
                        }
                    }
                }
            },
            "/weatherforecast": {
                "get": {
                    "operationId": "GetWeatherForecast",
                    "security": [ { "Bearer": [] } ],
                    "responses": {
                        "200": {
                            "description": "Five day forecast",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "array",
                                        "items": { "$ref": "#/components/schemas/WeatherForecast" }
                                    }
                                }
                            }
                        },
                        "401": { "description": "Missing or invalid bearer token" }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "WeatherForecast": {
                    "type": "object",
                    "properties": {
                        "date": { "type": "string", "format": "date" },
                        "temperatureC": { "type": "integer", "format": "int32" },
                        "temperatureF": { "type": "integer", "format": "int32" },
                        "summary": { "type": "string", "nullable": true }
                    }
                }
            },
            "securitySchemes": {
                "Bearer": {
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "JWT",
                    "description": bearer_description,
                }
            }
        }
    })
}
