use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub email: String,
    pub doctor_id: String,
}

/// Input data for creating or updating a doctor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorInput {
    pub name: String,
    pub email: String,
}

impl DoctorInput {
    pub fn into_doctor(self, id: String) -> Doctor {
        Doctor {
            id,
            name: self.name,
            email: self.email,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInput {
    pub name: String,
    pub email: String,
    pub doctor_id: String,
}

impl PatientInput {
    pub fn into_patient(self, id: String) -> Patient {
        Patient {
            id,
            name: self.name,
            email: self.email,
            doctor_id: self.doctor_id,
        }
    }
}
