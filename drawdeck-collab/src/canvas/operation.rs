use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PrimaryKey;

/// One unit of canvas change, in the shape the client sends it.
///
/// The stamp fields are filled in by the relay for operations that pass
/// through the server log. Undo and redo are forwarded exactly as
/// received, so their stamps stay empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawOperation {
    #[serde(flatten)]
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<PrimaryKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperationKind {
    /// A freehand stroke from the pen or eraser tool
    #[serde(rename_all = "camelCase")]
    Line {
        tool: String,
        /// Flat x/y pairs
        points: Vec<f64>,
        stroke: String,
        stroke_width: f64,
        /// "destination-out" for the eraser
        #[serde(skip_serializing_if = "Option::is_none")]
        global_composite_operation: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Shape {
        shape_type: ShapeKind,
        x: f64,
        y: f64,
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
        /// Arrow endpoints as flat x/y pairs
        #[serde(skip_serializing_if = "Option::is_none")]
        points: Option<Vec<f64>>,
        stroke: String,
        stroke_width: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        radius: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fill: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pointer_length: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pointer_width: Option<f64>,
    },
    /// Wipes the room canvas for everyone
    Clear,
    /// Client-computed history step, carrying the resulting full state
    #[serde(rename_all = "camelCase")]
    Undo {
        lines: Value,
        shapes: Value,
        history_index: i64,
    },
    #[serde(rename_all = "camelCase")]
    Redo {
        lines: Value,
        shapes: Value,
        history_index: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Arrow,
    Line,
    Text,
}

impl DrawOperation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            timestamp: None,
            user_id: None,
            username: None,
        }
    }

    /// True for the operations that live in the server-side room log
    pub fn is_logged(&self) -> bool {
        matches!(
            self.kind,
            OperationKind::Line { .. } | OperationKind::Shape { .. }
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_line_payload_deserializes() {
        let payload = json!({
            "type": "line",
            "tool": "pen",
            "points": [10.0, 20.0, 11.0, 21.0],
            "stroke": "#000000",
            "strokeWidth": 5.0,
            "globalCompositeOperation": "source-over",
        });

        let operation: DrawOperation = serde_json::from_value(payload).unwrap();

        assert!(operation.is_logged());
        assert_eq!(operation.timestamp, None);

        match operation.kind {
            OperationKind::Line {
                ref tool, points, ..
            } => {
                assert_eq!(tool, "pen");
                assert_eq!(points.len(), 4);
            }
            other => panic!("expected line, got {:?}", other),
        }
    }

    #[test]
    fn stamped_operation_serializes_with_camel_case_stamp() {
        let mut operation = DrawOperation::new(OperationKind::Clear);
        operation.timestamp = Some(1700000000000);
        operation.user_id = Some(7);
        operation.username = Some("ada".to_string());

        let value = serde_json::to_value(&operation).unwrap();

        assert_eq!(value["type"], "clear");
        assert_eq!(value["timestamp"], 1700000000000i64);
        assert_eq!(value["userId"], 7);
        assert_eq!(value["username"], "ada");
    }

    #[test]
    fn undo_carries_full_snapshot() {
        let payload = json!({
            "type": "undo",
            "lines": [{"tool": "pen"}],
            "shapes": [],
            "historyIndex": 2,
        });

        let operation: DrawOperation = serde_json::from_value(payload).unwrap();

        assert!(!operation.is_logged());
        match operation.kind {
            OperationKind::Undo { history_index, .. } => assert_eq!(history_index, 2),
            other => panic!("expected undo, got {:?}", other),
        }
    }
}
