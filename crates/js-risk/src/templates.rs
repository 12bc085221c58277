use crate::types::RiskTier;

/// A ready-made Acrobat JavaScript payload.
#[derive(Debug, Clone, Copy)]
pub struct PayloadTemplate {
    pub id: &'static str,
    pub description: &'static str,
    pub expected_tier: RiskTier,
    pub code: &'static str,
}

pub fn templates() -> &'static [PayloadTemplate] {
    TEMPLATES
}

pub fn find_template(id: &str) -> Option<&'static PayloadTemplate> {
    TEMPLATES.iter().find(|t| t.id == id)
}

static TEMPLATES: &[PayloadTemplate] = &[
    PayloadTemplate {
        id: "simple_alert",
        description: "Shows a welcome message when the PDF opens",
        expected_tier: RiskTier::Low,
        code: r#"// Simple welcome message
app.alert({
  cMsg: "Welcome! This PDF has been enhanced with JavaScript.",
  nIcon: 3,
  cTitle: "PDF Enhanced"
});"#,
    },
    PayloadTemplate {
        id: "auto_print",
        description: "Prints the PDF when opened",
        expected_tier: RiskTier::Low,
        code: r#"// Print without the dialog
this.print({
  bUI: false,
  bSilent: true,
  bShrinkToFit: true
});"#,
    },
    PayloadTemplate {
        id: "form_validation",
        description: "Warns about empty required form fields",
        expected_tier: RiskTier::Low,
        code: r#"function validateRequiredFields() {
  var nameField = this.getField("name");
  var emailField = this.getField("email");

  if (nameField && nameField.value === "") {
    app.alert("Name field is required!", 1);
    nameField.setFocus();
    return false;
  }

  if (emailField && emailField.value === "") {
    app.alert("Email field is required!", 1);
    emailField.setFocus();
    return false;
  }

  return true;
}

validateRequiredFields();"#,
    },
    PayloadTemplate {
        id: "date_timestamp",
        description: "Writes the open time into a form field and the console",
        expected_tier: RiskTier::Low,
        code: r#"var now = new Date();
var timestamp = util.printd("yyyy-mm-dd HH:MM:ss", now);

var timestampField = this.getField("timestamp");
if (timestampField) {
  timestampField.value = "Document opened: " + timestamp;
}

console.println("PDF accessed at: " + timestamp);"#,
    },
    PayloadTemplate {
        id: "security_warning",
        description: "Shows a confidentiality notice and logs access",
        expected_tier: RiskTier::Low,
        code: r#"app.alert({
  cMsg: "CONFIDENTIAL DOCUMENT\n\n" +
        "This document contains sensitive information.\n" +
        "Unauthorized distribution is prohibited.\n\n" +
        "By clicking OK, you acknowledge you are authorized to view this content.",
  nIcon: 2,
  cTitle: "Security Notice"
});

console.println("Confidential document accessed: " + new Date());"#,
    },
    PayloadTemplate {
        id: "advanced_form_logic",
        description: "Recalculates invoice totals when order fields change",
        expected_tier: RiskTier::Low,
        code: r#"function calculateTotal() {
  var quantity = this.getField("quantity").value || 0;
  var price = this.getField("price").value || 0;
  var tax = this.getField("tax").value || 0;

  var subtotal = quantity * price;
  var total = subtotal + (subtotal * tax / 100);

  this.getField("subtotal").value = subtotal.toFixed(2);
  this.getField("total").value = total.toFixed(2);
}

this.getField("quantity").setAction("OnBlur", "calculateTotal()");
this.getField("price").setAction("OnBlur", "calculateTotal()");
this.getField("tax").setAction("OnBlur", "calculateTotal()");

calculateTotal();"#,
    },
    PayloadTemplate {
        id: "data_extraction",
        description: "Displays document metadata in an alert",
        expected_tier: RiskTier::Low,
        code: r#"var info = this.info;
var metadata = "PDF Information:\n";
metadata += "Title: " + (info.Title || "Not set") + "\n";
metadata += "Author: " + (info.Author || "Not set") + "\n";
metadata += "Subject: " + (info.Subject || "Not set") + "\n";
metadata += "Creator: " + (info.Creator || "Not set") + "\n";
metadata += "Pages: " + this.numPages + "\n";
metadata += "Created: " + (info.CreationDate || "Unknown") + "\n";

app.alert({
  cMsg: metadata,
  cTitle: "Document Information"
});"#,
    },
];
